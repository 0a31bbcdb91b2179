use chrono::Utc;
use entity::{category, menu_item, user};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter,
};
use uuid::Uuid;

use crate::directory::{self, Role};

/// Ids of the demo records, for fixtures and local smoke testing.
#[derive(Debug, Clone)]
pub struct SeededRecords {
    pub admin: Uuid,
    pub manager: Uuid,
    pub crew: Uuid,
    pub other_crew: Uuid,
    pub customer: Uuid,
    pub other_customer: Uuid,
    pub starters: Uuid,
    pub mains: Uuid,
    pub desserts: Uuid,
    pub bruschetta: Uuid,
    pub greek_salad: Uuid,
    pub pasta: Uuid,
    pub grilled_fish: Uuid,
    pub lemon_dessert: Uuid,
}

/// Idempotent: existing usernames, slugs and titles are reused.
pub async fn seed_demo(db: &DatabaseConnection) -> Result<SeededRecords, DbErr> {
    let admin = ensure_user(db, "admin", "Site Admin", &[Role::SysAdmin, Role::Manager]).await?;
    let manager = ensure_user(db, "adrian", "Adrian Manager", &[Role::Manager]).await?;
    let crew = ensure_user(db, "mario", "Mario Delivery", &[Role::DeliveryCrew]).await?;
    let other_crew = ensure_user(db, "luigi", "Luigi Delivery", &[Role::DeliveryCrew]).await?;
    let customer = ensure_user(db, "tilly", "Tilly Customer", &[Role::Customer]).await?;
    let other_customer = ensure_user(db, "sam", "Sam Customer", &[Role::Customer]).await?;

    let starters = ensure_category(db, "Starters", "starters").await?;
    let mains = ensure_category(db, "Mains", "mains").await?;
    let desserts = ensure_category(db, "Desserts", "desserts").await?;

    let bruschetta = ensure_item(db, "Bruschetta", 750, true, starters).await?;
    let greek_salad = ensure_item(db, "Greek Salad", 1250, false, starters).await?;
    let pasta = ensure_item(db, "Pasta", 1000, false, mains).await?;
    let grilled_fish = ensure_item(db, "Grilled Fish", 2000, true, mains).await?;
    let lemon_dessert = ensure_item(db, "Lemon Dessert", 500, false, desserts).await?;

    Ok(SeededRecords {
        admin,
        manager,
        crew,
        other_crew,
        customer,
        other_customer,
        starters,
        mains,
        desserts,
        bruschetta,
        greek_salad,
        pasta,
        grilled_fish,
        lemon_dessert,
    })
}

async fn ensure_user(
    db: &DatabaseConnection,
    username: &str,
    display_name: &str,
    roles: &[Role],
) -> Result<Uuid, DbErr> {
    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;
    let id = match existing {
        Some(model) => model.id,
        None => {
            let now = timestamp();
            user::ActiveModel {
                id: Set(Uuid::new_v4()),
                username: Set(username.to_string()),
                email: Set(format!("{username}@littlelemon.test")),
                display_name: Set(display_name.to_string()),
                is_active: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await?
            .id
        }
    };
    for role in roles {
        directory::grant(db, id, *role).await?;
    }
    Ok(id)
}

async fn ensure_category(db: &DatabaseConnection, title: &str, slug: &str) -> Result<Uuid, DbErr> {
    if let Some(model) = category::Entity::find()
        .filter(category::Column::Slug.eq(slug))
        .one(db)
        .await?
    {
        return Ok(model.id);
    }
    let now = timestamp();
    let model = category::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(title.to_string()),
        slug: Set(slug.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(model.id)
}

async fn ensure_item(
    db: &DatabaseConnection,
    title: &str,
    price_cents: i64,
    featured: bool,
    category_id: Uuid,
) -> Result<Uuid, DbErr> {
    if let Some(model) = menu_item::Entity::find()
        .filter(menu_item::Column::Title.eq(title))
        .one(db)
        .await?
    {
        return Ok(model.id);
    }
    let now = timestamp();
    let model = menu_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(title.to_string()),
        price_cents: Set(price_cents),
        featured: Set(featured),
        category_id: Set(category_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(model.id)
}

fn timestamp() -> DateTimeWithTimeZone {
    Utc::now().into()
}
