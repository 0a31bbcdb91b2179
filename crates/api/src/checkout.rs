//! Checkout Workflow: converts a customer's cart into an immutable purchase
//! and a pending order inside one transaction.
//!
//! ```text
//! Started -> CartValidated -> PurchaseSnapshotted -> OrderCreated -> CartCleared -> Committed
//! ```
//!
//! Any failure aborts the run. The transaction is dropped without commit, so
//! the cart keeps its lines and no purchase or order becomes visible.

use std::collections::HashMap;

use chrono::Utc;
use entity::{cart_line, customer_order, menu_item, purchase, purchase_item};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cart::{find_cart_for_update, lines_of};
use crate::error::{ServiceError, ServiceResult};
use crate::money;
use crate::permission::{Access, Resource, Verb};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutStage {
    Started,
    CartValidated,
    PurchaseSnapshotted,
    OrderCreated,
    CartCleared,
    Committed,
}

#[derive(Clone, Debug)]
pub struct CheckoutReceipt {
    pub order: customer_order::Model,
    pub purchase: purchase::Model,
    pub items: Vec<purchase_item::Model>,
}

pub async fn checkout(db: &DatabaseConnection, access: &Access) -> ServiceResult<CheckoutReceipt> {
    let customer = access.identity()?;
    access.require(Verb::Create, &Resource::Orders)?;
    access.require(Verb::Update, &Resource::Cart { owner: customer })?;
    let span = info_span!("restaurant.checkout", customer = %customer);
    async move {
        let mut stage = CheckoutStage::Started;
        match run(db, customer, &mut stage).await {
            Ok(receipt) => {
                info!(
                    order = %receipt.order.id,
                    purchase = %receipt.purchase.id,
                    total_cents = receipt.order.total_cents,
                    "checkout committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                warn!(stage = ?stage, error = %err, "checkout aborted");
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}

async fn run(
    db: &DatabaseConnection,
    customer: Uuid,
    stage: &mut CheckoutStage,
) -> ServiceResult<CheckoutReceipt> {
    let txn = db.begin().await?;

    let cart = find_cart_for_update(&txn, customer)
        .await?
        .ok_or(ServiceError::NotFound("cart"))?;
    let lines = lines_of(&txn, customer).await?;
    if lines.is_empty() {
        return Err(ServiceError::invalid_state("cannot check out an empty cart"));
    }
    advance(stage, CheckoutStage::CartValidated);
    debug!(cart = %cart.id, lines = lines.len(), "cart validated");

    let now: DateTimeWithTimeZone = Utc::now().into();
    let titles = menu_titles(&txn, &lines).await?;
    let purchase = purchase::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(customer),
        created_at: Set(now),
    }
    .insert(&txn)
    .await?;
    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        let title = titles
            .get(&line.menu_item_id)
            .cloned()
            .ok_or(ServiceError::NotFound("menu item"))?;
        let item = purchase_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_id: Set(purchase.id),
            menu_item_id: Set(Some(line.menu_item_id)),
            title: Set(title),
            quantity: Set(line.quantity),
            unit_price_cents: Set(line.unit_price_cents),
            line_price_cents: Set(line.line_price_cents),
        }
        .insert(&txn)
        .await?;
        items.push(item);
    }
    advance(stage, CheckoutStage::PurchaseSnapshotted);

    // Totals come from the snapshot, never from live menu prices.
    let total_cents = money::sum_cents(items.iter().map(|item| item.line_price_cents))?;
    let order = customer_order::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(customer),
        purchase_id: Set(purchase.id),
        delivery_crew_id: Set(None),
        status: Set(customer_order::Status::Pending),
        total_cents: Set(total_cents),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;
    advance(stage, CheckoutStage::OrderCreated);

    let snapshot_ids: Vec<Uuid> = lines.iter().map(|line| line.id).collect();
    let cleared = cart_line::Entity::delete_many()
        .filter(cart_line::Column::UserId.eq(customer))
        .filter(cart_line::Column::Id.is_in(snapshot_ids))
        .exec(&txn)
        .await?;
    if cleared.rows_affected != lines.len() as u64 {
        return Err(ServiceError::conflict(
            "cart changed while checking out; retry",
        ));
    }
    advance(stage, CheckoutStage::CartCleared);

    txn.commit().await?;
    advance(stage, CheckoutStage::Committed);

    Ok(CheckoutReceipt {
        order,
        purchase,
        items,
    })
}

fn advance(stage: &mut CheckoutStage, next: CheckoutStage) {
    debug!(from = ?*stage, to = ?next, "checkout stage");
    *stage = next;
}

async fn menu_titles<C>(
    conn: &C,
    lines: &[cart_line::Model],
) -> ServiceResult<HashMap<Uuid, String>>
where
    C: sea_orm::ConnectionTrait,
{
    let ids: Vec<Uuid> = lines.iter().map(|line| line.menu_item_id).collect();
    let items = menu_item::Entity::find()
        .filter(menu_item::Column::Id.is_in(ids))
        .all(conn)
        .await?;
    Ok(items.into_iter().map(|item| (item.id, item.title)).collect())
}
