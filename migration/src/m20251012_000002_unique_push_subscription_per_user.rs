use sea_orm_migration::prelude::*;

use crate::m20251001_000001_create_push_subscriptions_table::PushSubscriptions;

const INDEX_NAME: &str = "idx_push_subscriptions_user_id";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Older deployments registered through an insert-only path; keep the newest row per user.
        let db = manager.get_connection();
        db.execute_unprepared(
            "
                DELETE FROM push_subscriptions
                WHERE id IN (
                    SELECT older.id
                    FROM push_subscriptions older
                    JOIN push_subscriptions newer
                      ON newer.user_id = older.user_id
                     AND (newer.updated_at > older.updated_at
                          OR (newer.updated_at = older.updated_at AND newer.id > older.id))
                )
            ",
        )
        .await?;

        manager
            .create_index(
                Index::create()
                    .name(INDEX_NAME)
                    .table(PushSubscriptions::Table)
                    .col(PushSubscriptions::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name(INDEX_NAME)
                    .table(PushSubscriptions::Table)
                    .to_owned(),
            )
            .await
    }
}
