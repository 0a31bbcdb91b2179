use sea_orm_migration::prelude::*;

use crate::m20261001_000001_accounts::User;
use crate::m20261001_000002_catalog::MenuItem;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Cart {
    Table,
    Id,
    UserId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CartLine {
    Table,
    Id,
    CartId,
    UserId,
    MenuItemId,
    Quantity,
    UnitPriceCents,
    LinePriceCents,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Purchase {
    Table,
    Id,
    UserId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PurchaseItem {
    Table,
    Id,
    PurchaseId,
    MenuItemId,
    Title,
    Quantity,
    UnitPriceCents,
    LinePriceCents,
}

#[derive(DeriveIden)]
enum CustomerOrder {
    Table,
    Id,
    UserId,
    PurchaseId,
    DeliveryCrewId,
    Status,
    TotalCents,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Cart::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Cart::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Cart::UserId).uuid().not_null().unique_key())
                    .col(
                        ColumnDef::new(Cart::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cart_user")
                            .from(Cart::Table, Cart::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CartLine::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CartLine::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(CartLine::CartId).uuid().not_null())
                    .col(ColumnDef::new(CartLine::UserId).uuid().not_null())
                    .col(ColumnDef::new(CartLine::MenuItemId).uuid().not_null())
                    .col(
                        ColumnDef::new(CartLine::Quantity)
                            .integer()
                            .not_null()
                            .check(Expr::col(CartLine::Quantity).gte(1)),
                    )
                    .col(
                        ColumnDef::new(CartLine::UnitPriceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CartLine::LinePriceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CartLine::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CartLine::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cart_line_cart")
                            .from(CartLine::Table, CartLine::CartId)
                            .to(Cart::Table, Cart::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cart_line_menu_item")
                            .from(CartLine::Table, CartLine::MenuItemId)
                            .to(MenuItem::Table, MenuItem::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_cart_line_user_menu_item")
                    .table(CartLine::Table)
                    .col(CartLine::UserId)
                    .col(CartLine::MenuItemId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Purchase::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Purchase::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Purchase::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Purchase::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_purchase_user")
                            .from(Purchase::Table, Purchase::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_purchase_user")
                    .table(Purchase::Table)
                    .col(Purchase::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PurchaseItem::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PurchaseItem::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PurchaseItem::PurchaseId).uuid().not_null())
                    .col(ColumnDef::new(PurchaseItem::MenuItemId).uuid().null())
                    .col(ColumnDef::new(PurchaseItem::Title).string_len(255).not_null())
                    .col(ColumnDef::new(PurchaseItem::Quantity).integer().not_null())
                    .col(
                        ColumnDef::new(PurchaseItem::UnitPriceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseItem::LinePriceCents)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_purchase_item_purchase")
                            .from(PurchaseItem::Table, PurchaseItem::PurchaseId)
                            .to(Purchase::Table, Purchase::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_purchase_item_menu_item")
                            .from(PurchaseItem::Table, PurchaseItem::MenuItemId)
                            .to(MenuItem::Table, MenuItem::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CustomerOrder::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomerOrder::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CustomerOrder::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(CustomerOrder::PurchaseId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(CustomerOrder::DeliveryCrewId).uuid().null())
                    .col(
                        ColumnDef::new(CustomerOrder::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(CustomerOrder::TotalCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerOrder::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerOrder::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::cust("(status IN ('PENDING','DELIVERED'))"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_order_user")
                            .from(CustomerOrder::Table, CustomerOrder::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_order_purchase")
                            .from(CustomerOrder::Table, CustomerOrder::PurchaseId)
                            .to(Purchase::Table, Purchase::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_order_delivery_crew")
                            .from(CustomerOrder::Table, CustomerOrder::DeliveryCrewId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, col) in [
            ("idx_customer_order_user", CustomerOrder::UserId),
            ("idx_customer_order_delivery_crew", CustomerOrder::DeliveryCrewId),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(CustomerOrder::Table)
                        .col(col)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CustomerOrder::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PurchaseItem::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Purchase::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CartLine::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Cart::Table).to_owned())
            .await
    }
}
