//! Cart Aggregate: one cart per customer holding lines pending checkout.

use chrono::Utc;
use entity::{cart, cart_line, menu_item};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseBackend,
    DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::money;
use crate::permission::{Access, Resource, Verb};

#[derive(Clone, Debug)]
pub struct CartView {
    pub owner: Uuid,
    pub lines: Vec<cart_line::Model>,
    pub total_cents: i64,
}

pub async fn view(db: &DatabaseConnection, access: &Access) -> ServiceResult<CartView> {
    let owner = owner_of(access, Verb::Read)?;
    let lines = lines_of(db, owner).await?;
    let total_cents = money::sum_cents(lines.iter().map(|line| line.line_price_cents))?;
    Ok(CartView {
        owner,
        lines,
        total_cents,
    })
}

/// Adds `quantity` of a menu item. An existing line for the same item is
/// updated in place and repriced from the current menu price.
pub async fn add_line(
    db: &DatabaseConnection,
    access: &Access,
    menu_item_id: Uuid,
    quantity: Option<i32>,
) -> ServiceResult<cart_line::Model> {
    let owner = owner_of(access, Verb::Create)?;
    let quantity = quantity.unwrap_or(1);
    validate_quantity(quantity)?;
    let span = info_span!(
        "restaurant.cart.add_line",
        customer = %owner,
        menu_item = %menu_item_id,
        quantity
    );
    async move {
        let txn = db.begin().await?;
        let item = menu_item::Entity::find_by_id(menu_item_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("menu item"))?;
        let cart = locked_cart(&txn, owner).await?;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let existing = cart_line::Entity::find()
            .filter(cart_line::Column::UserId.eq(owner))
            .filter(cart_line::Column::MenuItemId.eq(menu_item_id))
            .one(&txn)
            .await?;
        let saved = match existing {
            Some(line) => {
                let merged = line.quantity.checked_add(quantity).ok_or_else(|| {
                    ServiceError::invalid("quantity", "quantity is out of range")
                })?;
                let line_price = money::line_total(item.price_cents, merged)?;
                let mut active: cart_line::ActiveModel = line.into();
                active.quantity = Set(merged);
                active.unit_price_cents = Set(item.price_cents);
                active.line_price_cents = Set(line_price);
                active.updated_at = Set(now);
                debug!(quantity = merged, "cart line merged");
                active.update(&txn).await?
            }
            None => {
                let line_price = money::line_total(item.price_cents, quantity)?;
                cart_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    user_id: Set(owner),
                    menu_item_id: Set(menu_item_id),
                    quantity: Set(quantity),
                    unit_price_cents: Set(item.price_cents),
                    line_price_cents: Set(line_price),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(duplicate_line)?
            }
        };
        txn.commit().await?;
        Ok(saved)
    }
    .instrument(span)
    .await
}

/// Sets the quantity of an owned line and reprices it from the current menu.
pub async fn set_line_quantity(
    db: &DatabaseConnection,
    access: &Access,
    line_id: Uuid,
    quantity: i32,
) -> ServiceResult<cart_line::Model> {
    let owner = owner_of(access, Verb::Update)?;
    validate_quantity(quantity)?;
    let span = info_span!("restaurant.cart.set_quantity", customer = %owner, line = %line_id);
    async move {
        let txn = db.begin().await?;
        locked_cart(&txn, owner).await?;
        let line = owned_line(&txn, owner, line_id).await?;
        let item = menu_item::Entity::find_by_id(line.menu_item_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("menu item"))?;
        let line_price = money::line_total(item.price_cents, quantity)?;
        let mut active: cart_line::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.unit_price_cents = Set(item.price_cents);
        active.line_price_cents = Set(line_price);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }
    .instrument(span)
    .await
}

pub async fn remove_line(
    db: &DatabaseConnection,
    access: &Access,
    line_id: Uuid,
) -> ServiceResult<()> {
    let owner = owner_of(access, Verb::Delete)?;
    let result = cart_line::Entity::delete_many()
        .filter(cart_line::Column::Id.eq(line_id))
        .filter(cart_line::Column::UserId.eq(owner))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound("cart line"));
    }
    debug!(customer = %owner, line = %line_id, "cart line removed");
    Ok(())
}

/// Removes every line; clearing an empty cart is not an error.
pub async fn clear(db: &DatabaseConnection, access: &Access) -> ServiceResult<u64> {
    let owner = owner_of(access, Verb::Delete)?;
    let result = cart_line::Entity::delete_many()
        .filter(cart_line::Column::UserId.eq(owner))
        .exec(db)
        .await?;
    debug!(customer = %owner, removed = result.rows_affected, "cart cleared");
    Ok(result.rows_affected)
}

pub(crate) async fn lines_of<C>(conn: &C, owner: Uuid) -> ServiceResult<Vec<cart_line::Model>>
where
    C: ConnectionTrait,
{
    Ok(cart_line::Entity::find()
        .filter(cart_line::Column::UserId.eq(owner))
        .order_by_asc(cart_line::Column::CreatedAt)
        .order_by_asc(cart_line::Column::Id)
        .all(conn)
        .await?)
}

fn owner_of(access: &Access, verb: Verb) -> ServiceResult<Uuid> {
    let owner = access.identity()?;
    access.require(verb, &Resource::Cart { owner })?;
    Ok(owner)
}

/// Fetches the owner's cart, creating it on first use, and holds a row lock on
/// it so cart mutations for one customer are serialized.
async fn locked_cart(txn: &DatabaseTransaction, owner: Uuid) -> ServiceResult<cart::Model> {
    if let Some(cart) = find_cart_for_update(txn, owner).await? {
        return Ok(cart);
    }
    let created = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(owner),
        created_at: Set(Utc::now().into()),
    }
    .insert(txn)
    .await
    .map_err(|err| match ServiceError::from(err) {
        ServiceError::Conflict(_) => ServiceError::conflict("cart was created concurrently"),
        other => other,
    })?;
    Ok(created)
}

/// Row-locks the owner's cart. SQLite has no row locks and serializes
/// writers on its own, so the lock clause is only emitted elsewhere.
pub(crate) async fn find_cart_for_update(
    txn: &DatabaseTransaction,
    owner: Uuid,
) -> ServiceResult<Option<cart::Model>> {
    let mut query = cart::Entity::find().filter(cart::Column::UserId.eq(owner));
    if txn.get_database_backend() != DatabaseBackend::Sqlite {
        query = query.lock_exclusive();
    }
    Ok(query.one(txn).await?)
}

async fn owned_line(
    txn: &DatabaseTransaction,
    owner: Uuid,
    line_id: Uuid,
) -> ServiceResult<cart_line::Model> {
    cart_line::Entity::find_by_id(line_id)
        .filter(cart_line::Column::UserId.eq(owner))
        .one(txn)
        .await?
        .ok_or(ServiceError::NotFound("cart line"))
}

fn duplicate_line(err: sea_orm::DbErr) -> ServiceError {
    match ServiceError::from(err) {
        ServiceError::Conflict(_) => {
            ServiceError::conflict("a line for this menu item was added concurrently")
        }
        other => other,
    }
}

fn validate_quantity(quantity: i32) -> ServiceResult<()> {
    if quantity < 1 {
        return Err(ServiceError::invalid("quantity", "must be at least 1"));
    }
    Ok(())
}
