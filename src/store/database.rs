use async_trait::async_trait;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::OnConflict,
};
use uuid::Uuid;

use super::{PushSubscription, StoreError, SubscriptionFilter, SubscriptionStore};
use crate::domain::SubscriptionData;
use crate::entities::push_subscriptions;

/// `push_subscriptions` table accessed through sea-orm. Postgres in
/// production; SQLite works as well.
#[derive(Clone)]
pub struct DatabaseSubscriptionStore {
    db: DatabaseConnection,
}

impl DatabaseSubscriptionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<PushSubscription>, StoreError> {
        let model = push_subscriptions::Entity::find()
            .filter(push_subscriptions::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }
}

#[async_trait]
impl SubscriptionStore for DatabaseSubscriptionStore {
    #[tracing::instrument(name = "Querying push subscriptions", skip(self))]
    async fn find_subscriptions(&self, filter: &SubscriptionFilter) -> Result<Vec<PushSubscription>, StoreError> {
        let mut query = push_subscriptions::Entity::find().order_by_asc(push_subscriptions::Column::CreatedAt);
        if let SubscriptionFilter::ForUsers(user_ids) = filter {
            if user_ids.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(push_subscriptions::Column::UserId.is_in(user_ids.iter().copied()));
        }

        let models = query.all(&self.db).await.map_err(|e| {
            tracing::error!("Failed to query push subscriptions: {:?}", e);
            e
        })?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(name = "Saving push subscription", skip(self, data))]
    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        data: &SubscriptionData,
    ) -> Result<PushSubscription, StoreError> {
        let now = chrono::Utc::now();
        let subscription = push_subscriptions::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            subscription_data: Set(data.encode()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // The unique index on user_id turns a second registration into an update.
        push_subscriptions::Entity::insert(subscription)
            .on_conflict(
                OnConflict::column(push_subscriptions::Column::UserId)
                    .update_columns([
                        push_subscriptions::Column::SubscriptionData,
                        push_subscriptions::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to upsert push subscription: {:?}", e);
                e
            })?;

        self.find_by_user(user_id).await?.ok_or(StoreError::Missing(user_id))
    }

    #[tracing::instrument(name = "Deleting push subscription", skip(self))]
    async fn delete_subscription(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = push_subscriptions::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }
}
