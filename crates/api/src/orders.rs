//! Order Aggregate: fulfilment status and delivery assignment after checkout.

use chrono::Utc;
use entity::customer_order::Status;
use entity::{customer_order, purchase_item, user};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::directory::{self, Role};
use crate::error::{ServiceError, ServiceResult};
use crate::permission::{Access, OrderFields, OrderScope, Resource, Verb};
use crate::purchases::items_by_purchase;

#[derive(Clone, Debug)]
pub struct OrderView {
    pub order: customer_order::Model,
    pub items: Vec<purchase_item::Model>,
}

/// Partial order update. `delivery_crew: Some(None)` unassigns the crew.
#[derive(Clone, Debug, Default)]
pub struct OrderPatch {
    pub status: Option<i32>,
    pub delivery_crew: Option<Option<Uuid>>,
}

impl OrderPatch {
    fn fields(&self) -> OrderFields {
        OrderFields {
            status: self.status.is_some(),
            delivery_crew: self.delivery_crew.is_some(),
        }
    }
}

/// Orders visible to the caller: all for staff, assigned ones for delivery
/// crew, otherwise the caller's own.
pub async fn list(db: &DatabaseConnection, access: &Access) -> ServiceResult<Vec<OrderView>> {
    access.require(Verb::List, &Resource::Orders)?;
    let mut query = customer_order::Entity::find();
    match access.order_scope() {
        OrderScope::All => {}
        OrderScope::Assigned(crew) => {
            query = query.filter(customer_order::Column::DeliveryCrewId.eq(crew));
        }
        OrderScope::Owned(owner) => {
            query = query.filter(customer_order::Column::UserId.eq(owner));
        }
        OrderScope::Nothing => return Err(ServiceError::Unauthenticated),
    }
    let orders = query
        .order_by_desc(customer_order::Column::CreatedAt)
        .order_by_asc(customer_order::Column::Id)
        .all(db)
        .await?;
    with_items(db, orders).await
}

pub async fn get(db: &DatabaseConnection, access: &Access, id: Uuid) -> ServiceResult<OrderView> {
    access.identity()?;
    let order = find(db, id).await?;
    access.require(Verb::Read, &order_resource(&order, OrderFields::default()))?;
    let mut views = with_items(db, vec![order]).await?;
    views.pop().ok_or(ServiceError::NotFound("order"))
}

/// Applies a status change and/or crew assignment. The permission check comes
/// first; every field is then validated before anything is written, so a bad
/// status never lets a crew change through.
pub async fn update(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
    patch: OrderPatch,
) -> ServiceResult<OrderView> {
    access.identity()?;
    let span = info_span!(
        "restaurant.orders.update",
        order = %id,
        status = ?patch.status,
        crew = ?patch.delivery_crew
    );
    let updated = async move {
        let txn = db.begin().await?;
        let order = customer_order::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("order"))?;
        access.require(Verb::Update, &order_resource(&order, patch.fields()))?;
        let target_status = patch.status.map(parse_status).transpose()?;

        if let Some(Some(crew)) = patch.delivery_crew {
            user::Entity::find_by_id(crew)
                .one(&txn)
                .await?
                .ok_or(ServiceError::NotFound("user"))?;
            if !directory::has_role(&txn, crew, Role::DeliveryCrew).await? {
                return Err(ServiceError::invalid_state(
                    "assignee does not hold the delivery crew role",
                ));
            }
        }
        if let Some(next) = target_status {
            if order.status == Status::Delivered && next == Status::Pending {
                return Err(ServiceError::invalid_state(
                    "a delivered order cannot return to pending",
                ));
            }
        }

        let mut active: customer_order::ActiveModel = order.into();
        if let Some(next) = target_status {
            active.status = Set(next);
        }
        if let Some(crew) = patch.delivery_crew {
            active.delivery_crew_id = Set(crew);
        }
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&txn).await?;
        txn.commit().await?;
        info!(status = updated.status.code(), "order updated");
        Ok::<_, ServiceError>(updated)
    }
    .instrument(span)
    .await?;
    let mut views = with_items(db, vec![updated]).await?;
    views.pop().ok_or(ServiceError::NotFound("order"))
}

pub async fn update_status(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
    status: i32,
) -> ServiceResult<OrderView> {
    update(
        db,
        access,
        id,
        OrderPatch {
            status: Some(status),
            delivery_crew: None,
        },
    )
    .await
}

pub async fn assign_delivery_crew(
    db: &DatabaseConnection,
    access: &Access,
    id: Uuid,
    crew: Option<Uuid>,
) -> ServiceResult<OrderView> {
    update(
        db,
        access,
        id,
        OrderPatch {
            status: None,
            delivery_crew: Some(crew),
        },
    )
    .await
}

/// Deletes the order only; its purchase stays as the historical record.
pub async fn delete(db: &DatabaseConnection, access: &Access, id: Uuid) -> ServiceResult<()> {
    access.identity()?;
    let span = info_span!("restaurant.orders.delete", order = %id);
    async move {
        let txn = db.begin().await?;
        let order = customer_order::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("order"))?;
        access.require(Verb::Delete, &order_resource(&order, OrderFields::default()))?;
        customer_order::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        info!(purchase = %order.purchase_id, "order deleted");
        Ok(())
    }
    .instrument(span)
    .await
}

fn parse_status(code: i32) -> ServiceResult<Status> {
    Status::from_code(code)
        .ok_or_else(|| ServiceError::invalid("status", "must be 0 (pending) or 1 (delivered)"))
}

fn order_resource(order: &customer_order::Model, fields: OrderFields) -> Resource {
    Resource::Order {
        owner: order.user_id,
        delivery_crew: order.delivery_crew_id,
        fields,
    }
}

async fn find(db: &DatabaseConnection, id: Uuid) -> ServiceResult<customer_order::Model> {
    customer_order::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound("order"))
}

async fn with_items(
    db: &DatabaseConnection,
    orders: Vec<customer_order::Model>,
) -> ServiceResult<Vec<OrderView>> {
    let purchase_ids: Vec<Uuid> = orders.iter().map(|order| order.purchase_id).collect();
    let mut items = items_by_purchase(db, &purchase_ids).await?;
    Ok(orders
        .into_iter()
        .map(|order| OrderView {
            items: items.remove(&order.purchase_id).unwrap_or_default(),
            order,
        })
        .collect())
}
