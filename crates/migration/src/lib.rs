pub use sea_orm_migration::prelude::*;

mod m20261001_000001_accounts;
mod m20261001_000002_catalog;
mod m20261001_000003_ordering;

pub struct Migrator;
#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_accounts::Migration),
            Box::new(m20261001_000002_catalog::Migration),
            Box::new(m20261001_000003_ordering::Migration),
        ]
    }
}
