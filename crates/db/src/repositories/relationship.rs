//! Relationship repository.

use std::sync::Arc;

use crate::entities::{Relationship, relationship};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, TransactionTrait,
};
use versia_common::{AppError, AppResult};

/// Relationship repository for database operations.
///
/// Rows are keyed by the ordered `(owner, subject)` pair. Callers that need
/// both directions (the full relationship view, block coupling) issue two
/// lookups or use the transactional helpers here.
#[derive(Clone)]
pub struct RelationshipRepository {
    db: Arc<DatabaseConnection>,
}

impl RelationshipRepository {
    /// Create a new relationship repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a relationship row by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<relationship::Model>> {
        Relationship::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the row recording `owner_id`'s stance toward `subject_id`.
    pub async fn find_by_pair(
        &self,
        owner_id: &str,
        subject_id: &str,
    ) -> AppResult<Option<relationship::Model>> {
        Relationship::find()
            .filter(relationship::Column::OwnerId.eq(owner_id))
            .filter(relationship::Column::SubjectId.eq(subject_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Check whether `owner_id` follows `subject_id`.
    pub async fn is_following(&self, owner_id: &str, subject_id: &str) -> AppResult<bool> {
        Ok(self
            .find_by_pair(owner_id, subject_id)
            .await?
            .is_some_and(|r| r.following))
    }

    /// Check whether `owner_id` blocks `subject_id`.
    pub async fn is_blocking(&self, owner_id: &str, subject_id: &str) -> AppResult<bool> {
        Ok(self
            .find_by_pair(owner_id, subject_id)
            .await?
            .is_some_and(|r| r.blocking))
    }

    /// Check whether either side blocks the other.
    pub async fn is_blocked_either_way(&self, a: &str, b: &str) -> AppResult<bool> {
        if self.is_blocking(a, b).await? {
            return Ok(true);
        }
        self.is_blocking(b, a).await
    }

    /// Create a new relationship row.
    pub async fn create(&self, model: relationship::ActiveModel) -> AppResult<relationship::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a relationship row.
    pub async fn update(&self, model: relationship::ActiveModel) -> AppResult<relationship::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a relationship row by ID.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        Relationship::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Rows of users who follow `user_id` (for delivery fan-out).
    pub async fn find_followers(&self, user_id: &str) -> AppResult<Vec<relationship::Model>> {
        Relationship::find()
            .filter(relationship::Column::SubjectId.eq(user_id))
            .filter(relationship::Column::Following.eq(true))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Rows of users `user_id` follows.
    pub async fn find_following(&self, user_id: &str) -> AppResult<Vec<relationship::Model>> {
        Relationship::find()
            .filter(relationship::Column::OwnerId.eq(user_id))
            .filter(relationship::Column::Following.eq(true))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Pending incoming follow requests toward `user_id`.
    pub async fn find_pending_requests(&self, user_id: &str) -> AppResult<Vec<relationship::Model>> {
        Relationship::find()
            .filter(relationship::Column::SubjectId.eq(user_id))
            .filter(relationship::Column::Requested.eq(true))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count accepted followers of a user.
    pub async fn count_followers(&self, user_id: &str) -> AppResult<u64> {
        Relationship::find()
            .filter(relationship::Column::SubjectId.eq(user_id))
            .filter(relationship::Column::Following.eq(true))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count users a user follows.
    pub async fn count_following(&self, user_id: &str) -> AppResult<u64> {
        Relationship::find()
            .filter(relationship::Column::OwnerId.eq(user_id))
            .filter(relationship::Column::Following.eq(true))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Timed mutes that have lapsed as of `now`.
    pub async fn find_expired_mutes(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> AppResult<Vec<relationship::Model>> {
        Relationship::find()
            .filter(relationship::Column::Muting.eq(true))
            .filter(relationship::Column::MuteExpiresAt.is_not_null())
            .filter(relationship::Column::MuteExpiresAt.lte(now))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Apply a block from `owner_id` toward `subject_id`.
    ///
    /// In a single transaction: sets `blocking` on the owner's row (creating
    /// it with `new_row_id` if absent), and clears `following`/`requested` in
    /// BOTH directions so no follow edge survives a block.
    pub async fn apply_block(
        &self,
        owner_id: &str,
        subject_id: &str,
        new_row_id: &str,
    ) -> AppResult<relationship::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let now = Utc::now();

        let existing = Relationship::find()
            .filter(relationship::Column::OwnerId.eq(owner_id))
            .filter(relationship::Column::SubjectId.eq(subject_id))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = match existing {
            Some(model) => {
                let mut active: relationship::ActiveModel = model.into();
                active.blocking = Set(true);
                active.following = Set(false);
                active.requested = Set(false);
                active.updated_at = Set(Some(now.into()));
                active
                    .update(&txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?
            }
            None => {
                let active = relationship::ActiveModel {
                    id: Set(new_row_id.to_string()),
                    owner_id: Set(owner_id.to_string()),
                    subject_id: Set(subject_id.to_string()),
                    blocking: Set(true),
                    following: Set(false),
                    requested: Set(false),
                    muting: Set(false),
                    muting_notifications: Set(false),
                    mute_expires_at: Set(None),
                    endorsed: Set(false),
                    note: Set(None),
                    languages: Set(None),
                    created_at: Set(now.into()),
                    updated_at: Set(None),
                };
                active
                    .insert(&txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?
            }
        };

        // Inverse direction loses its follow edge too
        let inverse = Relationship::find()
            .filter(relationship::Column::OwnerId.eq(subject_id))
            .filter(relationship::Column::SubjectId.eq(owner_id))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if let Some(model) = inverse {
            if model.following || model.requested {
                let mut active: relationship::ActiveModel = model.into();
                active.following = Set(false);
                active.requested = Set(false);
                active.updated_at = Set(Some(now.into()));
                active
                    .update(&txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_relationship(
        id: &str,
        owner_id: &str,
        subject_id: &str,
        following: bool,
    ) -> relationship::Model {
        relationship::Model {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            subject_id: subject_id.to_string(),
            following,
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

    #[tokio::test]
    async fn test_find_by_pair_found() {
        let rel = create_test_relationship("r1", "alice", "bob", true);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[rel.clone()]])
                .into_connection(),
        );

        let repo = RelationshipRepository::new(db);
        let result = repo.find_by_pair("alice", "bob").await.unwrap();

        assert!(result.is_some());
        assert!(result.unwrap().following);
    }

    #[tokio::test]
    async fn test_is_following_false_when_row_absent() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<relationship::Model>::new()])
                .into_connection(),
        );

        let repo = RelationshipRepository::new(db);
        assert!(!repo.is_following("alice", "bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_following_false_when_only_requested() {
        let mut rel = create_test_relationship("r1", "alice", "bob", false);
        rel.requested = true;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[rel]])
                .into_connection(),
        );

        let repo = RelationshipRepository::new(db);
        assert!(!repo.is_following("alice", "bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_blocked_either_way() {
        let mut rel = create_test_relationship("r1", "bob", "alice", false);
        rel.blocking = true;

        // First lookup (alice -> bob) empty, second (bob -> alice) blocking
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<relationship::Model>::new()])
                .append_query_results([[rel]])
                .into_connection(),
        );

        let repo = RelationshipRepository::new(db);
        assert!(repo.is_blocked_either_way("alice", "bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_followers_filters_following() {
        let rel = create_test_relationship("r1", "bob", "alice", true);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[rel]])
                .into_connection(),
        );

        let repo = RelationshipRepository::new(db);
        let followers = repo.find_followers("alice").await.unwrap();

        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].owner_id, "bob");
    }
}
