//! Catalog Store: categories, menu items and customer ratings.

use std::collections::HashMap;

use chrono::Utc;
use entity::{cart_line, category, menu_item, purchase_item, rating};
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::money::{self, MIN_PRICE_CENTS};
use crate::permission::{Access, Resource, Verb};

const MAX_TITLE_LEN: usize = 255;
const MAX_SCORE: i32 = 5;

#[derive(Clone, Debug)]
pub struct CategoryDraft {
    pub title: String,
    pub slug: String,
}

#[derive(Clone, Debug, Default)]
pub struct CategoryPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MenuItemDraft {
    pub title: String,
    pub price: Decimal,
    pub featured: bool,
    pub category_id: Uuid,
}

#[derive(Clone, Debug, Default)]
pub struct MenuItemPatch {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub featured: Option<bool>,
    pub category_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default)]
pub struct MenuFilter {
    pub category_id: Option<Uuid>,
    pub featured: Option<bool>,
}

/// A menu item together with its mean customer score.
#[derive(Clone, Debug)]
pub struct MenuItemView {
    pub item: menu_item::Model,
    pub average_rating: Option<f64>,
}

pub async fn list_categories(
    db: &DatabaseConnection,
    access: &Access,
) -> ServiceResult<Vec<category::Model>> {
    access.require(Verb::List, &Resource::Category)?;
    Ok(category::Entity::find()
        .order_by_asc(category::Column::Title)
        .order_by_asc(category::Column::Id)
        .all(db)
        .await?)
}

pub async fn get_category(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
) -> ServiceResult<category::Model> {
    access.require(Verb::Read, &Resource::Category)?;
    category::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound("category"))
}

pub async fn create_category(
    db: &DatabaseConnection,
    access: &Access,
    draft: CategoryDraft,
) -> ServiceResult<category::Model> {
    access.require(Verb::Create, &Resource::Category)?;
    let title = clean_title("title", &draft.title)?;
    let slug = clean_slug(&draft.slug)?;
    let span = info_span!("restaurant.catalog.create_category", slug = %slug);
    async move {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let created = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title),
            slug: Set(slug),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
        info!(category = %created.id, "category created");
        Ok(created)
    }
    .instrument(span)
    .await
}

pub async fn update_category(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
    patch: CategoryPatch,
) -> ServiceResult<category::Model> {
    access.require(Verb::Update, &Resource::Category)?;
    let title = patch
        .title
        .as_deref()
        .map(|value| clean_title("title", value))
        .transpose()?;
    let slug = patch.slug.as_deref().map(clean_slug).transpose()?;

    let existing = category::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound("category"))?;
    let mut active: category::ActiveModel = existing.into();
    if let Some(title) = title {
        active.title = Set(title);
    }
    if let Some(slug) = slug {
        active.slug = Set(slug);
    }
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(db).await?)
}

/// Fails while any menu item still references the category.
pub async fn delete_category(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
) -> ServiceResult<()> {
    access.require(Verb::Delete, &Resource::Category)?;
    let span = info_span!("restaurant.catalog.delete_category", category = %id);
    async move {
        let txn = db.begin().await?;
        category::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("category"))?;
        let referencing = menu_item::Entity::find()
            .filter(menu_item::Column::CategoryId.eq(id))
            .count(&txn)
            .await?;
        if referencing > 0 {
            return Err(ServiceError::invalid_state(format!(
                "category is still used by {referencing} menu item(s)"
            )));
        }
        category::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        info!("category deleted");
        Ok(())
    }
    .instrument(span)
    .await
}

pub async fn list_menu_items(
    db: &DatabaseConnection,
    access: &Access,
    filter: MenuFilter,
) -> ServiceResult<Vec<MenuItemView>> {
    access.require(Verb::List, &Resource::MenuItem)?;
    let mut query = menu_item::Entity::find();
    if let Some(category_id) = filter.category_id {
        query = query.filter(menu_item::Column::CategoryId.eq(category_id));
    }
    if let Some(featured) = filter.featured {
        query = query.filter(menu_item::Column::Featured.eq(featured));
    }
    let items = query
        .order_by_asc(menu_item::Column::Title)
        .all(db)
        .await?;
    with_ratings(db, items).await
}

pub async fn get_menu_item(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
) -> ServiceResult<MenuItemView> {
    access.require(Verb::Read, &Resource::MenuItem)?;
    let item = menu_item::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound("menu item"))?;
    let mut views = with_ratings(db, vec![item]).await?;
    views.pop().ok_or(ServiceError::NotFound("menu item"))
}

pub async fn create_menu_item(
    db: &DatabaseConnection,
    access: &Access,
    draft: MenuItemDraft,
) -> ServiceResult<menu_item::Model> {
    access.require(Verb::Create, &Resource::MenuItem)?;
    let title = clean_title("title", &draft.title)?;
    let price_cents = clean_price(draft.price)?;
    let span = info_span!("restaurant.catalog.create_menu_item", title = %title);
    async move {
        let txn = db.begin().await?;
        ensure_category(&txn, draft.category_id).await?;
        ensure_title_free(&txn, &title, None).await?;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let created = menu_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title),
            price_cents: Set(price_cents),
            featured: Set(draft.featured),
            category_id: Set(draft.category_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;
        info!(menu_item = %created.id, "menu item created");
        Ok(created)
    }
    .instrument(span)
    .await
}

/// Every supplied field is validated before anything is written.
pub async fn update_menu_item(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
    patch: MenuItemPatch,
) -> ServiceResult<menu_item::Model> {
    access.require(Verb::Update, &Resource::MenuItem)?;
    let title = patch
        .title
        .as_deref()
        .map(|value| clean_title("title", value))
        .transpose()?;
    let price_cents = patch.price.map(clean_price).transpose()?;
    let span = info_span!("restaurant.catalog.update_menu_item", menu_item = %id);
    async move {
        let txn = db.begin().await?;
        let existing = menu_item::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("menu item"))?;
        if let Some(category_id) = patch.category_id {
            ensure_category(&txn, category_id).await?;
        }
        if let Some(title) = title.as_deref() {
            ensure_title_free(&txn, title, Some(id)).await?;
        }

        let mut active: menu_item::ActiveModel = existing.into();
        if let Some(title) = title {
            active.title = Set(title);
        }
        if let Some(price_cents) = price_cents {
            active.price_cents = Set(price_cents);
        }
        if let Some(featured) = patch.featured {
            active.featured = Set(featured);
        }
        if let Some(category_id) = patch.category_id {
            active.category_id = Set(category_id);
        }
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }
    .instrument(span)
    .await
}

/// Removes the item with its pending cart lines and ratings. Purchase history
/// keeps its snapshot with the item link cleared.
pub async fn delete_menu_item(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
) -> ServiceResult<()> {
    access.require(Verb::Delete, &Resource::MenuItem)?;
    let span = info_span!("restaurant.catalog.delete_menu_item", menu_item = %id);
    async move {
        let txn = db.begin().await?;
        menu_item::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("menu item"))?;
        let lines = cart_line::Entity::delete_many()
            .filter(cart_line::Column::MenuItemId.eq(id))
            .exec(&txn)
            .await?;
        rating::Entity::delete_many()
            .filter(rating::Column::MenuItemId.eq(id))
            .exec(&txn)
            .await?;
        purchase_item::Entity::update_many()
            .col_expr(purchase_item::Column::MenuItemId, Expr::value(None::<Uuid>))
            .filter(purchase_item::Column::MenuItemId.eq(id))
            .exec(&txn)
            .await?;
        menu_item::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        info!(cart_lines = lines.rows_affected, "menu item deleted");
        Ok(())
    }
    .instrument(span)
    .await
}

/// One rating per customer and item; rating again replaces the score.
pub async fn rate_menu_item(
    db: &DatabaseConnection,
    access: &Access,
    menu_item_id: Uuid,
    score: i32,
) -> ServiceResult<rating::Model> {
    let customer = access.identity()?;
    access.require(Verb::Create, &Resource::Rating)?;
    if !(0..=MAX_SCORE).contains(&score) {
        return Err(ServiceError::invalid(
            "score",
            format!("must be between 0 and {MAX_SCORE}"),
        ));
    }
    let span = info_span!(
        "restaurant.catalog.rate",
        customer = %customer,
        menu_item = %menu_item_id
    );
    async move {
        let txn = db.begin().await?;
        menu_item::Entity::find_by_id(menu_item_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("menu item"))?;
        let existing = rating::Entity::find()
            .filter(rating::Column::UserId.eq(customer))
            .filter(rating::Column::MenuItemId.eq(menu_item_id))
            .one(&txn)
            .await?;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let saved = match existing {
            Some(current) => {
                access.require(Verb::Update, &Resource::Rating)?;
                let mut active: rating::ActiveModel = current.into();
                active.score = Set(score);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                rating::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(customer),
                    menu_item_id: Set(menu_item_id),
                    score: Set(score),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };
        txn.commit().await?;
        Ok(saved)
    }
    .instrument(span)
    .await
}

async fn with_ratings(
    db: &DatabaseConnection,
    items: Vec<menu_item::Model>,
) -> ServiceResult<Vec<MenuItemView>> {
    let ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
    let averages = average_ratings(db, &ids).await?;
    Ok(items
        .into_iter()
        .map(|item| MenuItemView {
            average_rating: averages.get(&item.id).copied(),
            item,
        })
        .collect())
}

pub async fn average_ratings(
    db: &DatabaseConnection,
    ids: &[Uuid],
) -> ServiceResult<HashMap<Uuid, f64>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = rating::Entity::find()
        .filter(rating::Column::MenuItemId.is_in(ids.iter().copied()))
        .all(db)
        .await?;
    let mut totals: HashMap<Uuid, (i64, i64)> = HashMap::new();
    for row in rows {
        let entry = totals.entry(row.menu_item_id).or_default();
        entry.0 += i64::from(row.score);
        entry.1 += 1;
    }
    Ok(totals
        .into_iter()
        .map(|(id, (sum, count))| (id, sum as f64 / count as f64))
        .collect())
}

async fn ensure_category<C>(conn: &C, id: Uuid) -> ServiceResult<()>
where
    C: sea_orm::ConnectionTrait,
{
    category::Entity::find_by_id(id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or(ServiceError::NotFound("category"))
}

async fn ensure_title_free<C>(conn: &C, title: &str, except: Option<Uuid>) -> ServiceResult<()>
where
    C: sea_orm::ConnectionTrait,
{
    let mut query = menu_item::Entity::find().filter(menu_item::Column::Title.eq(title));
    if let Some(id) = except {
        query = query.filter(menu_item::Column::Id.ne(id));
    }
    if query.count(conn).await? > 0 {
        return Err(ServiceError::conflict(format!(
            "a menu item titled \"{title}\" already exists"
        )));
    }
    Ok(())
}

fn clean_title(field: &'static str, value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid(field, "is required"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(ServiceError::invalid(
            field,
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn clean_slug(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid("slug", "is required"));
    }
    if trimmed.len() > MAX_TITLE_LEN {
        return Err(ServiceError::invalid(
            "slug",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(ServiceError::invalid(
            "slug",
            "may only contain lowercase letters, digits, '-' and '_'",
        ));
    }
    Ok(trimmed.to_string())
}

fn clean_price(value: Decimal) -> ServiceResult<i64> {
    let cents = money::to_cents("price", value)?;
    if cents < MIN_PRICE_CENTS {
        return Err(ServiceError::invalid(
            "price",
            format!("must be at least {}", money::to_decimal(MIN_PRICE_CENTS)),
        ));
    }
    Ok(cents)
}
