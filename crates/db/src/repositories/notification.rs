//! Notification repository.

use std::sync::Arc;

use crate::entities::{Notification, notification};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use versia_common::{AppError, AppResult};

/// Notification repository for database operations.
#[derive(Clone)]
pub struct NotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepository {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a notification by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<notification::Model>> {
        Notification::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a notification unless one for the same entity already exists.
    ///
    /// Deduplication key is `(user_id, actor_id, kind, entity_uri)`; a
    /// redelivered federation entity therefore notifies at most once.
    /// Returns `None` when the notification was suppressed as a duplicate.
    pub async fn create_if_absent(
        &self,
        model: notification::ActiveModel,
    ) -> AppResult<Option<notification::Model>> {
        use sea_orm::ActiveValue;

        let (ActiveValue::Set(user_id), ActiveValue::Set(actor_id), ActiveValue::Set(kind)) =
            (&model.user_id, &model.actor_id, &model.kind)
        else {
            return Err(AppError::Internal(
                "Notification dedup fields must be set before insert".to_string(),
            ));
        };

        let mut query = Notification::find()
            .filter(notification::Column::UserId.eq(user_id.clone()))
            .filter(notification::Column::ActorId.eq(actor_id.clone()))
            .filter(notification::Column::Kind.eq(kind.clone()));

        query = match &model.entity_uri {
            ActiveValue::Set(Some(uri)) => {
                query.filter(notification::Column::EntityUri.eq(uri.clone()))
            }
            _ => query.filter(notification::Column::EntityUri.is_null()),
        };

        let existing = query
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if existing.is_some() {
            return Ok(None);
        }

        let created = model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Some(created))
    }

    /// Recent notifications for a user, newest first.
    pub async fn find_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<notification::Model>> {
        Notification::find()
            .filter(notification::Column::UserId.eq(user_id))
            .order_by_desc(notification::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the notification caused by a federation entity, by its URI.
    ///
    /// Used to resolve retractions: an inbound Undo names the entity it
    /// undoes, and the notification row records which users it touched.
    pub async fn find_by_entity_uri(
        &self,
        entity_uri: &str,
    ) -> AppResult<Option<notification::Model>> {
        Notification::find()
            .filter(notification::Column::EntityUri.eq(entity_uri))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete notifications that reference an entity URI (e.g. when the
    /// follow that caused them is retracted).
    pub async fn delete_by_entity_uri(&self, entity_uri: &str) -> AppResult<()> {
        Notification::delete_many()
            .filter(notification::Column::EntityUri.eq(entity_uri))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::notification::NotificationKind;
    use chrono::Utc;
    use sea_orm::{ActiveValue::Set, DatabaseBackend, MockDatabase};

    fn create_test_notification(id: &str, user_id: &str, actor_id: &str) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            actor_id: actor_id.to_string(),
            kind: NotificationKind::Follow,
            entity_uri: Some("https://remote.example/follows/1".to_string()),
            is_read: false,
            created_at: Utc::now().into(),
        }
    }

    fn active_model_for(model: &notification::Model) -> notification::ActiveModel {
        notification::ActiveModel {
            id: Set(model.id.clone()),
            user_id: Set(model.user_id.clone()),
            actor_id: Set(model.actor_id.clone()),
            kind: Set(model.kind.clone()),
            entity_uri: Set(model.entity_uri.clone()),
            is_read: Set(false),
            created_at: Set(model.created_at),
        }
    }

    #[tokio::test]
    async fn test_create_if_absent_inserts_new() {
        let model = create_test_notification("n1", "alice", "bob");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                // Dedup lookup finds nothing, then the insert returns the row
                .append_query_results([Vec::<notification::Model>::new()])
                .append_query_results([[model.clone()]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let created = repo
            .create_if_absent(active_model_for(&model))
            .await
            .unwrap();

        assert!(created.is_some());
    }

    #[tokio::test]
    async fn test_create_if_absent_suppresses_duplicate() {
        let model = create_test_notification("n1", "alice", "bob");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[model.clone()]])
                .into_connection(),
        );

        let repo = NotificationRepository::new(db);
        let created = repo
            .create_if_absent(active_model_for(&model))
            .await
            .unwrap();

        assert!(created.is_none());
    }
}
