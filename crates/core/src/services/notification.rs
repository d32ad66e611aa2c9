//! Notification service.

use chrono::Utc;
use sea_orm::ActiveValue::Set;
use versia_common::{AppResult, IdGenerator};
use versia_db::{
    entities::notification::{self, NotificationKind},
    repositories::NotificationRepository,
};

/// Notification service for follow-related notifications.
///
/// All creation goes through the repository's deduplicated insert, so a
/// redelivered federation entity never notifies twice.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub const fn new(notification_repo: NotificationRepository) -> Self {
        Self {
            notification_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Notify `user_id` that `actor_id` now follows them.
    pub async fn notify_follow(
        &self,
        user_id: &str,
        actor_id: &str,
        entity_uri: Option<&str>,
    ) -> AppResult<()> {
        self.create(user_id, actor_id, NotificationKind::Follow, entity_uri)
            .await
    }

    /// Notify `user_id` of a pending follow request from `actor_id`.
    pub async fn notify_follow_request(
        &self,
        user_id: &str,
        actor_id: &str,
        entity_uri: Option<&str>,
    ) -> AppResult<()> {
        self.create(user_id, actor_id, NotificationKind::FollowRequest, entity_uri)
            .await
    }

    /// Notify `user_id` that `actor_id` accepted their follow request.
    pub async fn notify_follow_accepted(
        &self,
        user_id: &str,
        actor_id: &str,
        entity_uri: Option<&str>,
    ) -> AppResult<()> {
        self.create(
            user_id,
            actor_id,
            NotificationKind::FollowAccepted,
            entity_uri,
        )
        .await
    }

    /// Remove notifications caused by a retracted entity.
    pub async fn retract(&self, entity_uri: &str) -> AppResult<()> {
        self.notification_repo.delete_by_entity_uri(entity_uri).await
    }

    /// Recent notifications for a user.
    pub async fn list(&self, user_id: &str, limit: u64) -> AppResult<Vec<notification::Model>> {
        self.notification_repo.find_for_user(user_id, limit).await
    }

    async fn create(
        &self,
        user_id: &str,
        actor_id: &str,
        kind: NotificationKind,
        entity_uri: Option<&str>,
    ) -> AppResult<()> {
        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            actor_id: Set(actor_id.to_string()),
            kind: Set(kind.clone()),
            entity_uri: Set(entity_uri.map(ToString::to_string)),
            is_read: Set(false),
            created_at: Set(Utc::now().into()),
        };

        let created = self.notification_repo.create_if_absent(model).await?;
        if created.is_none() {
            tracing::debug!(
                user_id = user_id,
                actor_id = actor_id,
                kind = ?kind,
                "Duplicate notification suppressed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn make_notification(id: &str) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            user_id: "alice".to_string(),
            actor_id: "bob".to_string(),
            kind: NotificationKind::Follow,
            entity_uri: Some("https://remote.example/follows/1".to_string()),
            is_read: false,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_notify_follow_suppresses_redelivery() {
        // Dedup lookup already finds a row for this entity URI
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[make_notification("n1")]])
                .into_connection(),
        );

        let service = NotificationService::new(NotificationRepository::new(db));
        let result = service
            .notify_follow("alice", "bob", Some("https://remote.example/follows/1"))
            .await;

        assert!(result.is_ok());
    }
}
