pub use sea_orm_migration::prelude::*;

mod m20251001_000001_create_push_subscriptions_table;
mod m20251012_000002_unique_push_subscription_per_user;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251001_000001_create_push_subscriptions_table::Migration),
            Box::new(m20251012_000002_unique_push_subscription_per_user::Migration),
        ]
    }
}
