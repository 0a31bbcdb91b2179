use sea_orm_migration::prelude::*;

use crate::m20261001_000001_accounts::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
pub(crate) enum Category {
    Table,
    Id,
    Title,
    Slug,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum MenuItem {
    Table,
    Id,
    Title,
    PriceCents,
    Featured,
    CategoryId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Rating {
    Table,
    Id,
    UserId,
    MenuItemId,
    Score,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Category::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Category::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Category::Title).string_len(255).not_null())
                    .col(ColumnDef::new(Category::Slug).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Category::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Category::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_category_slug")
                    .table(Category::Table)
                    .col(Category::Slug)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MenuItem::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MenuItem::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(MenuItem::Title)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(MenuItem::PriceCents)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(MenuItem::PriceCents).gte(200)),
                    )
                    .col(
                        ColumnDef::new(MenuItem::Featured)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(MenuItem::CategoryId).uuid().not_null())
                    .col(
                        ColumnDef::new(MenuItem::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MenuItem::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_menu_item_category")
                            .from(MenuItem::Table, MenuItem::CategoryId)
                            .to(Category::Table, Category::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_menu_item_category")
                    .table(MenuItem::Table)
                    .col(MenuItem::CategoryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Rating::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rating::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Rating::UserId).uuid().not_null())
                    .col(ColumnDef::new(Rating::MenuItemId).uuid().not_null())
                    .col(
                        ColumnDef::new(Rating::Score)
                            .integer()
                            .not_null()
                            .check(Expr::col(Rating::Score).between(0, 5)),
                    )
                    .col(
                        ColumnDef::new(Rating::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Rating::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rating_user")
                            .from(Rating::Table, Rating::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rating_menu_item")
                            .from(Rating::Table, Rating::MenuItemId)
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
                    .name("idx_rating_user_menu_item")
                    .table(Rating::Table)
                    .col(Rating::UserId)
                    .col(Rating::MenuItemId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Rating::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MenuItem::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Category::Table).to_owned())
            .await
    }
}
