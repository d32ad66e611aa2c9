//! Relationship service.
//!
//! The follow/block/mute state machine over directed `(owner, subject)`
//! relationship rows. Local mutations and inbound federation handlers both
//! land here, so every transition is written to be safe under redelivery.

use crate::services::delivery::DeliveryService;
use crate::services::notification::NotificationService;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use serde::Serialize;
use serde_json::json;
use versia_common::{AppError, AppResult, IdGenerator};
use versia_db::{
    entities::{relationship, user},
    repositories::{RelationshipRepository, UserRepository},
};

/// Outcome of a follow attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowResult {
    /// The follow is in effect.
    Following,
    /// The follow awaits the subject's approval.
    Pending,
}

/// API-facing view of one direction of a relationship.
///
/// `followed_by` is computed from the inverse row at read time; it is never
/// stored alongside the forward direction.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipView {
    /// The subject user this view is about.
    pub subject_id: String,
    pub following: bool,
    pub followed_by: bool,
    pub requested: bool,
    pub requested_by: bool,
    pub blocking: bool,
    pub blocked_by: bool,
    pub muting: bool,
    pub muting_notifications: bool,
    pub endorsed: bool,
    pub note: Option<String>,
    pub languages: Option<Vec<String>>,
}

/// Relationship service for business logic.
#[derive(Clone)]
pub struct RelationshipService {
    relationship_repo: RelationshipRepository,
    user_repo: UserRepository,
    notifications: NotificationService,
    delivery: Option<DeliveryService>,
    id_gen: IdGenerator,
}

impl RelationshipService {
    /// Create a new relationship service.
    #[must_use]
    pub fn new(
        relationship_repo: RelationshipRepository,
        user_repo: UserRepository,
        notifications: NotificationService,
    ) -> Self {
        Self {
            relationship_repo,
            user_repo,
            notifications,
            delivery: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a new relationship service with federation delivery support.
    #[must_use]
    pub fn with_delivery(
        relationship_repo: RelationshipRepository,
        user_repo: UserRepository,
        notifications: NotificationService,
        delivery: DeliveryService,
    ) -> Self {
        Self {
            relationship_repo,
            user_repo,
            notifications,
            delivery: Some(delivery),
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the delivery service.
    pub fn set_delivery(&mut self, delivery: DeliveryService) {
        self.delivery = Some(delivery);
    }

    /// The full relationship view from `owner_id` toward `subject_id`.
    ///
    /// Creates the zeroed forward row on first access.
    pub async fn relationship_view(
        &self,
        owner_id: &str,
        subject_id: &str,
    ) -> AppResult<RelationshipView> {
        let row = self.get_or_create_row(owner_id, subject_id).await?;
        let inverse = self
            .relationship_repo
            .find_by_pair(subject_id, owner_id)
            .await?;

        Ok(Self::build_view(&row, inverse.as_ref()))
    }

    /// Follow a user, or request to follow when the subject requires
    /// approval. Re-following an already-followed subject is a no-op.
    pub async fn request_follow(
        &self,
        owner_id: &str,
        subject_id: &str,
    ) -> AppResult<FollowResult> {
        if owner_id == subject_id {
            return Err(AppError::BadRequest("Cannot follow yourself".to_string()));
        }

        let owner = self.get_user(owner_id).await?;
        let subject = self.get_user(subject_id).await?;

        if self
            .relationship_repo
            .is_blocked_either_way(owner_id, subject_id)
            .await?
        {
            return Err(AppError::Forbidden(
                "Blocked relationship cannot follow".to_string(),
            ));
        }

        let row = self.relationship_repo.find_by_pair(owner_id, subject_id).await?;

        if let Some(ref existing) = row {
            if existing.following {
                return Ok(FollowResult::Following);
            }
            if existing.requested {
                return Ok(FollowResult::Pending);
            }
        }

        let result = if subject.is_locked {
            self.write_facets(row, owner_id, subject_id, |active| {
                active.requested = Set(true);
            })
            .await?;
            FollowResult::Pending
        } else {
            self.write_facets(row, owner_id, subject_id, |active| {
                active.following = Set(true);
            })
            .await?;
            self.user_repo.adjust_following_count(owner_id, 1).await?;
            self.user_repo.adjust_followers_count(subject_id, 1).await?;
            FollowResult::Following
        };

        if subject.is_local() {
            let notify = match result {
                FollowResult::Following => {
                    self.notifications
                        .notify_follow(subject_id, owner_id, None)
                        .await
                }
                FollowResult::Pending => {
                    self.notifications
                        .notify_follow_request(subject_id, owner_id, None)
                        .await
                }
            };
            if let Err(e) = notify {
                tracing::warn!(error = %e, "Failed to create follow notification");
            }
        }

        if let Some(ref delivery) = self.delivery
            && subject.is_remote()
            && let Err(e) = delivery.queue_follow(&owner, &subject).await
        {
            tracing::warn!(error = %e, "Failed to queue Follow entity");
        }

        Ok(result)
    }

    /// Record an inbound Follow entity: remote `owner_id` follows local
    /// `subject_id`.
    ///
    /// Idempotent on redelivery: no duplicate transition, no duplicate
    /// notification (keyed on `entity_uri`). The Accept answering an
    /// auto-accepted follow is re-queued even on redelivery, in case the
    /// previous one was lost.
    pub async fn handle_inbound_follow(
        &self,
        owner_id: &str,
        subject_id: &str,
        entity_uri: Option<&str>,
    ) -> AppResult<FollowResult> {
        let owner = self.get_user(owner_id).await?;
        let subject = self.get_user(subject_id).await?;

        if subject.is_suspended
            || self
                .relationship_repo
                .is_blocked_either_way(owner_id, subject_id)
                .await?
        {
            return Err(AppError::Forbidden("Follow not permitted".to_string()));
        }

        let row = self.relationship_repo.find_by_pair(owner_id, subject_id).await?;
        let already_following = row.as_ref().is_some_and(|r| r.following);
        let already_requested = row.as_ref().is_some_and(|r| r.requested);

        if subject.is_locked && !already_following {
            if !already_requested {
                self.write_facets(row, owner_id, subject_id, |active| {
                    active.requested = Set(true);
                })
                .await?;
                if let Err(e) = self
                    .notifications
                    .notify_follow_request(subject_id, owner_id, entity_uri)
                    .await
                {
                    tracing::warn!(error = %e, "Failed to create follow-request notification");
                }
            }
            return Ok(FollowResult::Pending);
        }

        if !already_following {
            self.write_facets(row, owner_id, subject_id, |active| {
                active.following = Set(true);
                active.requested = Set(false);
            })
            .await?;
            self.user_repo.adjust_following_count(owner_id, 1).await?;
            self.user_repo.adjust_followers_count(subject_id, 1).await?;

            if let Err(e) = self
                .notifications
                .notify_follow(subject_id, owner_id, entity_uri)
                .await
            {
                tracing::warn!(error = %e, "Failed to create follow notification");
            }
        }

        // Answer with Accept even on redelivery; the sender may be retrying
        // because our previous Accept never arrived.
        if let Some(ref delivery) = self.delivery
            && let Err(e) = delivery.queue_accept_follow(&subject, &owner).await
        {
            tracing::warn!(error = %e, "Failed to queue Accept entity");
        }

        Ok(FollowResult::Following)
    }

    /// Accept a follow request: `subject_id` approves `owner_id`'s request.
    ///
    /// A second accept for the same pair is a no-op; a redelivered Accept
    /// entity therefore causes no double transition.
    pub async fn accept_follow(
        &self,
        subject_id: &str,
        owner_id: &str,
        entity_uri: Option<&str>,
    ) -> AppResult<()> {
        let row = self
            .relationship_repo
            .find_by_pair(owner_id, subject_id)
            .await?;

        let Some(row) = row else {
            return Err(AppError::NotFound("Follow request not found".to_string()));
        };

        if row.following {
            return Ok(());
        }
        if !row.requested {
            return Err(AppError::NotFound("Follow request not found".to_string()));
        }

        let mut active: relationship::ActiveModel = row.into();
        active.requested = Set(false);
        active.following = Set(true);
        active.updated_at = Set(Some(Utc::now().into()));
        self.relationship_repo.update(active).await?;

        self.user_repo.adjust_following_count(owner_id, 1).await?;
        self.user_repo.adjust_followers_count(subject_id, 1).await?;

        let owner = self.get_user(owner_id).await?;
        let subject = self.get_user(subject_id).await?;

        if owner.is_local()
            && let Err(e) = self
                .notifications
                .notify_follow_accepted(owner_id, subject_id, entity_uri)
                .await
        {
            tracing::warn!(error = %e, "Failed to create follow-accepted notification");
        }

        if let Some(ref delivery) = self.delivery
            && subject.is_local()
            && owner.is_remote()
            && let Err(e) = delivery.queue_accept_follow(&subject, &owner).await
        {
            tracing::warn!(error = %e, "Failed to queue Accept entity");
        }

        Ok(())
    }

    /// Reject a follow request: `subject_id` declines `owner_id`'s request.
    pub async fn reject_follow(&self, subject_id: &str, owner_id: &str) -> AppResult<()> {
        let row = self
            .relationship_repo
            .find_by_pair(owner_id, subject_id)
            .await?;

        let Some(row) = row else {
            return Err(AppError::NotFound("Follow request not found".to_string()));
        };
        if !row.requested {
            return Err(AppError::NotFound("Follow request not found".to_string()));
        }

        let mut active: relationship::ActiveModel = row.into();
        active.requested = Set(false);
        active.updated_at = Set(Some(Utc::now().into()));
        self.relationship_repo.update(active).await?;

        let owner = self.get_user(owner_id).await?;
        let subject = self.get_user(subject_id).await?;

        if let Some(ref delivery) = self.delivery
            && subject.is_local()
            && owner.is_remote()
            && let Err(e) = delivery.queue_reject_follow(&subject, &owner).await
        {
            tracing::warn!(error = %e, "Failed to queue Reject entity");
        }

        Ok(())
    }

    /// Unfollow a user (also retracts a pending request).
    ///
    /// A delivery failure toward a remote subject propagates to the caller;
    /// a silently dropped retraction would leave the remote side convinced
    /// the follow still stands.
    pub async fn unfollow(&self, owner_id: &str, subject_id: &str) -> AppResult<()> {
        let row = self
            .relationship_repo
            .find_by_pair(owner_id, subject_id)
            .await?;

        let Some(row) = row else {
            return Err(AppError::NotFound("Not following".to_string()));
        };
        if !row.following && !row.requested {
            return Err(AppError::NotFound("Not following".to_string()));
        }

        let was_following = row.following;

        let mut active: relationship::ActiveModel = row.into();
        active.following = Set(false);
        active.requested = Set(false);
        active.updated_at = Set(Some(Utc::now().into()));
        self.relationship_repo.update(active).await?;

        if was_following {
            self.user_repo.adjust_following_count(owner_id, -1).await?;
            self.user_repo.adjust_followers_count(subject_id, -1).await?;
        }

        let owner = self.get_user(owner_id).await?;
        let subject = self.get_user(subject_id).await?;

        if let Some(ref delivery) = self.delivery
            && subject.is_remote()
        {
            delivery.queue_undo_follow(&owner, &subject).await?;
        }

        Ok(())
    }

    /// Block a user.
    ///
    /// Tears down the follow relationship in both directions atomically and
    /// retracts whichever directions were federated.
    pub async fn block(&self, owner_id: &str, subject_id: &str) -> AppResult<()> {
        if owner_id == subject_id {
            return Err(AppError::BadRequest("Cannot block yourself".to_string()));
        }

        let owner = self.get_user(owner_id).await?;
        let subject = self.get_user(subject_id).await?;

        let forward = self
            .relationship_repo
            .find_by_pair(owner_id, subject_id)
            .await?;
        let inverse = self
            .relationship_repo
            .find_by_pair(subject_id, owner_id)
            .await?;

        let forward_followed = forward.as_ref().is_some_and(|r| r.following);
        let inverse_followed = inverse.as_ref().is_some_and(|r| r.following);

        self.relationship_repo
            .apply_block(owner_id, subject_id, &self.id_gen.generate())
            .await?;

        if forward_followed {
            self.user_repo.adjust_following_count(owner_id, -1).await?;
            self.user_repo.adjust_followers_count(subject_id, -1).await?;
        }
        if inverse_followed {
            self.user_repo.adjust_following_count(subject_id, -1).await?;
            self.user_repo.adjust_followers_count(owner_id, -1).await?;
        }

        if let Some(ref delivery) = self.delivery
            && subject.is_remote()
        {
            if forward_followed
                && let Err(e) = delivery.queue_undo_follow(&owner, &subject).await
            {
                tracing::warn!(error = %e, "Failed to queue Undo entity for block");
            }
            if inverse_followed
                && let Err(e) = delivery.queue_reject_follow(&owner, &subject).await
            {
                tracing::warn!(error = %e, "Failed to queue Reject entity for block");
            }
        }

        Ok(())
    }

    /// Unblock a user.
    pub async fn unblock(&self, owner_id: &str, subject_id: &str) -> AppResult<()> {
        let row = self
            .relationship_repo
            .find_by_pair(owner_id, subject_id)
            .await?;

        let Some(row) = row else {
            return Ok(());
        };
        if !row.blocking {
            return Ok(());
        }

        let mut active: relationship::ActiveModel = row.into();
        active.blocking = Set(false);
        active.updated_at = Set(Some(Utc::now().into()));
        self.relationship_repo.update(active).await?;

        Ok(())
    }

    /// Mute a user. Never federated.
    pub async fn mute(
        &self,
        owner_id: &str,
        subject_id: &str,
        notifications: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let row = self.relationship_repo.find_by_pair(owner_id, subject_id).await?;
        self.write_facets(row, owner_id, subject_id, |active| {
            active.muting = Set(true);
            active.muting_notifications = Set(notifications);
            active.mute_expires_at = Set(expires_at.map(Into::into));
        })
        .await?;
        Ok(())
    }

    /// Unmute a user.
    pub async fn unmute(&self, owner_id: &str, subject_id: &str) -> AppResult<()> {
        let row = self.relationship_repo.find_by_pair(owner_id, subject_id).await?;
        self.write_facets(row, owner_id, subject_id, |active| {
            active.muting = Set(false);
            active.muting_notifications = Set(false);
            active.mute_expires_at = Set(None);
        })
        .await?;
        Ok(())
    }

    /// Replace the private note the owner keeps about the subject.
    pub async fn update_note(
        &self,
        owner_id: &str,
        subject_id: &str,
        note: Option<String>,
    ) -> AppResult<()> {
        let row = self.relationship_repo.find_by_pair(owner_id, subject_id).await?;
        self.write_facets(row, owner_id, subject_id, |active| {
            active.note = Set(note);
        })
        .await?;
        Ok(())
    }

    /// Replace the language filter for posts from the subject.
    pub async fn update_languages(
        &self,
        owner_id: &str,
        subject_id: &str,
        languages: Option<Vec<String>>,
    ) -> AppResult<()> {
        let row = self.relationship_repo.find_by_pair(owner_id, subject_id).await?;
        self.write_facets(row, owner_id, subject_id, |active| {
            active.languages = Set(languages.map(|l| json!(l)));
        })
        .await?;
        Ok(())
    }

    /// Endorse (feature) or un-endorse the subject.
    pub async fn set_endorsed(
        &self,
        owner_id: &str,
        subject_id: &str,
        endorsed: bool,
    ) -> AppResult<()> {
        let row = self.relationship_repo.find_by_pair(owner_id, subject_id).await?;
        if endorsed && !row.as_ref().is_some_and(|r| r.following) {
            return Err(AppError::BadRequest(
                "Can only endorse followed users".to_string(),
            ));
        }
        self.write_facets(row, owner_id, subject_id, |active| {
            active.endorsed = Set(endorsed);
        })
        .await?;
        Ok(())
    }

    /// Clear timed mutes that have lapsed. Returns how many were cleared.
    pub async fn sweep_expired_mutes(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let expired = self.relationship_repo.find_expired_mutes(now).await?;
        let count = expired.len() as u64;

        for row in expired {
            let owner_id = row.owner_id.clone();
            let subject_id = row.subject_id.clone();
            let mut active: relationship::ActiveModel = row.into();
            active.muting = Set(false);
            active.muting_notifications = Set(false);
            active.mute_expires_at = Set(None);
            active.updated_at = Set(Some(now.into()));
            self.relationship_repo.update(active).await?;
            tracing::debug!(
                owner_id = owner_id,
                subject_id = subject_id,
                "Timed mute expired"
            );
        }

        Ok(count)
    }

    /// Accepted followers of a user, as relationship rows.
    pub async fn followers_of(&self, user_id: &str) -> AppResult<Vec<relationship::Model>> {
        self.relationship_repo.find_followers(user_id).await
    }

    // === internals ===

    async fn get_user(&self, id: &str) -> AppResult<user::Model> {
        self.user_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ActorNotFound(id.to_string()))
    }

    async fn get_or_create_row(
        &self,
        owner_id: &str,
        subject_id: &str,
    ) -> AppResult<relationship::Model> {
        if let Some(row) = self
            .relationship_repo
            .find_by_pair(owner_id, subject_id)
            .await?
        {
            return Ok(row);
        }
        self.relationship_repo
            .create(self.zeroed_row(owner_id, subject_id))
            .await
    }

    /// Apply facet changes to an existing row or create the row with them.
    async fn write_facets<F>(
        &self,
        existing: Option<relationship::Model>,
        owner_id: &str,
        subject_id: &str,
        apply: F,
    ) -> AppResult<relationship::Model>
    where
        F: FnOnce(&mut relationship::ActiveModel),
    {
        match existing {
            Some(row) => {
                let mut active: relationship::ActiveModel = row.into();
                apply(&mut active);
                active.updated_at = Set(Some(Utc::now().into()));
                self.relationship_repo.update(active).await
            }
            None => {
                let mut active = self.zeroed_row(owner_id, subject_id);
                apply(&mut active);
                self.relationship_repo.create(active).await
            }
        }
    }

    fn zeroed_row(&self, owner_id: &str, subject_id: &str) -> relationship::ActiveModel {
        relationship::ActiveModel {
            id: Set(self.id_gen.generate()),
            owner_id: Set(owner_id.to_string()),
            subject_id: Set(subject_id.to_string()),
            following: Set(false),
            requested: Set(false),
            blocking: Set(false),
            muting: Set(false),
            muting_notifications: Set(false),
            mute_expires_at: Set(None),
            endorsed: Set(false),
            note: Set(None),
            languages: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        }
    }

    fn build_view(
        row: &relationship::Model,
        inverse: Option<&relationship::Model>,
    ) -> RelationshipView {
        RelationshipView {
            subject_id: row.subject_id.clone(),
            following: row.following,
            followed_by: inverse.is_some_and(|r| r.following),
            requested: row.requested,
            requested_by: inverse.is_some_and(|r| r.requested),
            blocking: row.blocking,
            blocked_by: inverse.is_some_and(|r| r.blocking),
            muting: row.muting,
            muting_notifications: row.muting_notifications,
            endorsed: row.endorsed,
            note: row.note.clone(),
            languages: row
                .languages
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;
    use versia_db::repositories::NotificationRepository;

    fn make_user(id: &str, host: Option<&str>, is_locked: bool) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: id.to_string(),
            username_lower: id.to_lowercase(),
            host: host.map(ToString::to_string),
            uri: host.map(|h| format!("https://{h}/users/{id}")),
            inbox: host.map(|h| format!("https://{h}/users/{id}/inbox")),
            shared_inbox: None,
            public_key: "AAAA".to_string(),
            private_key: None,
            name: None,
            description: None,
            avatar_url: None,
            banner_url: None,
            is_locked,
            is_suspended: false,
            followers_count: 0,
            following_count: 0,
            last_fetched_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn make_row(owner: &str, subject: &str) -> relationship::Model {
        relationship::Model {
            id: format!("rel-{owner}-{subject}"),
            owner_id: owner.to_string(),
            subject_id: subject.to_string(),
            following: false,
            requested: false,
            blocking: false,
            muting: false,
            muting_notifications: false,
            mute_expires_at: None,
            endorsed: false,
            note: None,
            languages: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service_with(db: Arc<sea_orm::DatabaseConnection>) -> RelationshipService {
        RelationshipService::new(
            RelationshipRepository::new(db.clone()),
            UserRepository::new(db.clone()),
            NotificationService::new(NotificationRepository::new(db)),
        )
    }

    #[tokio::test]
    async fn test_request_follow_self_rejected() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let service = service_with(db);

        let result = service.request_follow("alice", "alice").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_request_follow_blocked_forbidden() {
        let mut blocking_row = make_row("alice", "bob");
        blocking_row.blocking = true;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[make_user("alice", None, false)]])
                .append_query_results([[make_user("bob", None, false)]])
                .append_query_results([[blocking_row]])
                .into_connection(),
        );
        let service = service_with(db);

        let result = service.request_follow("alice", "bob").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_request_follow_locked_subject_is_pending() {
        let mut created = make_row("alice", "bob");
        created.requested = true;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[make_user("alice", None, false)]])
                .append_query_results([[make_user("bob", None, true)]])
                // Block checks, both directions empty
                .append_query_results([Vec::<relationship::Model>::new()])
                .append_query_results([Vec::<relationship::Model>::new()])
                // No existing row; insert returns the new one
                .append_query_results([Vec::<relationship::Model>::new()])
                .append_query_results([[created]])
                // Notification dedup finds nothing, insert succeeds
                .append_query_results([Vec::<versia_db::entities::notification::Model>::new()])
                .append_query_results([[versia_db::entities::notification::Model {
                    id: "n1".to_string(),
                    user_id: "bob".to_string(),
                    actor_id: "alice".to_string(),
                    kind: versia_db::entities::notification::NotificationKind::FollowRequest,
                    entity_uri: None,
                    is_read: false,
                    created_at: Utc::now().into(),
                }]])
                .into_connection(),
        );
        let service = service_with(db);

        let result = service.request_follow("alice", "bob").await.unwrap();
        assert_eq!(result, FollowResult::Pending);
    }

    #[tokio::test]
    async fn test_request_follow_already_following_is_noop() {
        let mut row = make_row("alice", "bob");
        row.following = true;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[make_user("alice", None, false)]])
                .append_query_results([[make_user("bob", None, false)]])
                .append_query_results([Vec::<relationship::Model>::new()])
                .append_query_results([Vec::<relationship::Model>::new()])
                .append_query_results([[row]])
                .into_connection(),
        );
        let service = service_with(db);

        let result = service.request_follow("alice", "bob").await.unwrap();
        assert_eq!(result, FollowResult::Following);
    }

    #[tokio::test]
    async fn test_accept_follow_second_call_is_noop() {
        let mut row = make_row("alice", "bob");
        row.following = true;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .into_connection(),
        );
        let service = service_with(db);

        // Accept after the transition already happened: no further writes
        let result = service.accept_follow("bob", "alice", None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_accept_follow_without_request_fails() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<relationship::Model>::new()])
                .into_connection(),
        );
        let service = service_with(db);

        let result = service.accept_follow("bob", "alice", None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unfollow_when_not_following_fails() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<relationship::Model>::new()])
                .into_connection(),
        );
        let service = service_with(db);

        let result = service.unfollow("alice", "bob").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_relationship_view_followed_by_from_inverse() {
        let forward = make_row("alice", "bob");
        let mut inverse = make_row("bob", "alice");
        inverse.following = true;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[forward]])
                .append_query_results([[inverse]])
                .into_connection(),
        );
        let service = service_with(db);

        let view = service.relationship_view("alice", "bob").await.unwrap();
        assert!(!view.following);
        assert!(view.followed_by);
        assert!(!view.blocking);
    }

    #[tokio::test]
    async fn test_inbound_follow_redelivery_no_duplicate_transition() {
        let mut row = make_row("remote-bob", "alice");
        row.following = true;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[make_user("remote-bob", Some("remote.example"), false)]])
                .append_query_results([[make_user("alice", None, false)]])
                // Block checks
                .append_query_results([Vec::<relationship::Model>::new()])
                .append_query_results([Vec::<relationship::Model>::new()])
                // Row already records the follow: nothing is written
                .append_query_results([[row]])
                .into_connection(),
        );
        let service = service_with(db);

        let result = service
            .handle_inbound_follow("remote-bob", "alice", Some("https://remote.example/follows/1"))
            .await
            .unwrap();
        assert_eq!(result, FollowResult::Following);
    }

    #[tokio::test]
    async fn test_sweep_expired_mutes_clears_rows() {
        let now = Utc::now();
        let mut row = make_row("alice", "bob");
        row.muting = true;
        row.mute_expires_at = Some((now - chrono::Duration::minutes(5)).into());

        let mut cleared = row.clone();
        cleared.muting = false;
        cleared.mute_expires_at = None;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .append_query_results([[cleared]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );
        let service = service_with(db);

        let count = service.sweep_expired_mutes(now).await.unwrap();
        assert_eq!(count, 1);
    }
}
