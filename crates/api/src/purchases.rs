use std::collections::HashMap;

use entity::{purchase, purchase_item};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::permission::{Access, Resource, Verb};

#[derive(Clone, Debug)]
pub struct PurchaseView {
    pub purchase: purchase::Model,
    pub items: Vec<purchase_item::Model>,
}

/// The caller's own purchases, newest first.
pub async fn list(db: &DatabaseConnection, access: &Access) -> ServiceResult<Vec<PurchaseView>> {
    let owner = access.identity()?;
    access.require(Verb::List, &Resource::Purchases)?;
    let purchases = purchase::Entity::find()
        .filter(purchase::Column::UserId.eq(owner))
        .order_by_desc(purchase::Column::CreatedAt)
        .order_by_asc(purchase::Column::Id)
        .all(db)
        .await?;
    let ids: Vec<Uuid> = purchases.iter().map(|p| p.id).collect();
    let mut items = items_by_purchase(db, &ids).await?;
    Ok(purchases
        .into_iter()
        .map(|purchase| PurchaseView {
            items: items.remove(&purchase.id).unwrap_or_default(),
            purchase,
        })
        .collect())
}

pub async fn get(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
) -> ServiceResult<PurchaseView> {
    let purchase = purchase::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound("purchase"))?;
    access.require(
        Verb::Read,
        &Resource::Purchase {
            owner: purchase.user_id,
        },
    )?;
    let mut items = items_by_purchase(db, &[purchase.id]).await?;
    Ok(PurchaseView {
        items: items.remove(&purchase.id).unwrap_or_default(),
        purchase,
    })
}

pub(crate) async fn items_by_purchase<C>(
    conn: &C,
    ids: &[Uuid],
) -> ServiceResult<HashMap<Uuid, Vec<purchase_item::Model>>>
where
    C: ConnectionTrait,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = purchase_item::Entity::find()
        .filter(purchase_item::Column::PurchaseId.is_in(ids.iter().copied()))
        .order_by_asc(purchase_item::Column::Title)
        .all(conn)
        .await?;
    let mut map: HashMap<Uuid, Vec<purchase_item::Model>> = HashMap::new();
    for row in rows {
        map.entry(row.purchase_id).or_default().push(row);
    }
    Ok(map)
}
