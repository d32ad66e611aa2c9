//! Federation delivery service.
//!
//! Provides an abstraction for queueing outbound federation entities.
//! The actual implementation is provided by the queue crate, which builds
//! the wire entities and hands them to the deliver workers.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use versia_common::AppResult;
use versia_db::entities::user;

/// Trait for outbound federation entity delivery.
///
/// This allows the core services to queue signed entity deliveries
/// without directly depending on the queue implementation.
#[async_trait]
pub trait EntityDelivery: Send + Sync {
    /// Queue a Follow entity from `follower` to `followee`'s inbox.
    async fn queue_follow(
        &self,
        follower: &user::Model,
        followee: &user::Model,
    ) -> AppResult<()>;

    /// Queue an Accept entity: `subject` approves `follower`'s request.
    async fn queue_accept_follow(
        &self,
        subject: &user::Model,
        follower: &user::Model,
    ) -> AppResult<()>;

    /// Queue a Reject entity: `subject` declines `follower`'s request.
    async fn queue_reject_follow(
        &self,
        subject: &user::Model,
        follower: &user::Model,
    ) -> AppResult<()>;

    /// Queue an Undo retracting `follower`'s follow of `followee`.
    async fn queue_undo_follow(
        &self,
        follower: &user::Model,
        followee: &user::Model,
    ) -> AppResult<()>;

    /// Queue a Delete entity (actor or note tombstone) to many inboxes.
    async fn queue_delete(
        &self,
        author: &user::Model,
        inboxes: Vec<String>,
        entity: Value,
    ) -> AppResult<()>;

    /// Queue an arbitrary entity to many inboxes (note/like fan-out).
    async fn queue_fan_out(
        &self,
        author_id: &str,
        inboxes: Vec<String>,
        entity: Value,
    ) -> AppResult<()>;
}

/// A no-op implementation of `EntityDelivery` for testing or when federation
/// is disabled.
#[derive(Clone, Default)]
pub struct NoOpDelivery;

#[async_trait]
impl EntityDelivery for NoOpDelivery {
    async fn queue_follow(
        &self,
        _follower: &user::Model,
        _followee: &user::Model,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn queue_accept_follow(
        &self,
        _subject: &user::Model,
        _follower: &user::Model,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn queue_reject_follow(
        &self,
        _subject: &user::Model,
        _follower: &user::Model,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn queue_undo_follow(
        &self,
        _follower: &user::Model,
        _followee: &user::Model,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn queue_delete(
        &self,
        _author: &user::Model,
        _inboxes: Vec<String>,
        _entity: Value,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn queue_fan_out(
        &self,
        _author_id: &str,
        _inboxes: Vec<String>,
        _entity: Value,
    ) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed `EntityDelivery` trait object.
pub type DeliveryService = Arc<dyn EntityDelivery>;
