//! Redis-backed implementations of the delivery and inbox queue seams.
//!
//! Core services talk to [`versia_core::EntityDelivery`] and the inbox
//! handler talks to [`versia_federation::InboxQueue`]; both resolve to this
//! service, which builds wire entities and pushes durable jobs for the
//! apalis workers.

use apalis::prelude::*;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use versia_common::{AppError, AppResult};
use versia_core::EntityDelivery;
use versia_db::entities::user;
use versia_federation::{EntityBuilder, InboxQueue, InboxRequest};

use crate::jobs::{DeliverJob, InboxJob};

/// Redis-backed federation queueing service.
#[derive(Clone)]
pub struct RedisDeliveryService {
    deliver_storage: apalis_redis::RedisStorage<DeliverJob>,
    inbox_storage: apalis_redis::RedisStorage<InboxJob>,
    builder: EntityBuilder,
}

impl RedisDeliveryService {
    /// Create a new Redis delivery service.
    #[must_use]
    pub const fn new(
        deliver_storage: apalis_redis::RedisStorage<DeliverJob>,
        inbox_storage: apalis_redis::RedisStorage<InboxJob>,
        builder: EntityBuilder,
    ) -> Self {
        Self {
            deliver_storage,
            inbox_storage,
            builder,
        }
    }

    /// Queue a delivery job for each inbox.
    async fn queue_to_inboxes(
        &self,
        sender_id: &str,
        entity: Value,
        inboxes: Vec<String>,
    ) -> AppResult<()> {
        for inbox in inboxes {
            let job = DeliverJob::new(sender_id.to_string(), inbox.clone(), entity.clone());

            self.deliver_storage
                .clone()
                .push(job)
                .await
                .map_err(|e| AppError::Queue(format!("Failed to queue delivery: {e}")))?;

            debug!(inbox = %inbox, "Queued delivery job");
        }

        Ok(())
    }

    /// The single inbox a directed entity for `recipient` goes to.
    fn inbox_of(&self, recipient: &user::Model) -> AppResult<String> {
        self.builder.inbox_for(recipient).ok_or_else(|| {
            AppError::Federation(format!("User {} has no reachable inbox", recipient.id))
        })
    }
}

#[async_trait]
impl EntityDelivery for RedisDeliveryService {
    async fn queue_follow(
        &self,
        follower: &user::Model,
        followee: &user::Model,
    ) -> AppResult<()> {
        let entity = serde_json::to_value(self.builder.build_follow(follower, followee))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let inbox = self.inbox_of(followee)?;

        tracing::info!(follower = %follower.id, followee = %followee.id, "Queueing Follow delivery");
        self.queue_to_inboxes(&follower.id, entity, vec![inbox]).await
    }

    async fn queue_accept_follow(
        &self,
        subject: &user::Model,
        follower: &user::Model,
    ) -> AppResult<()> {
        let entity = serde_json::to_value(self.builder.build_accept_follow(subject, follower))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let inbox = self.inbox_of(follower)?;

        tracing::info!(subject = %subject.id, follower = %follower.id, "Queueing Accept delivery");
        self.queue_to_inboxes(&subject.id, entity, vec![inbox]).await
    }

    async fn queue_reject_follow(
        &self,
        subject: &user::Model,
        follower: &user::Model,
    ) -> AppResult<()> {
        let entity = serde_json::to_value(self.builder.build_reject_follow(subject, follower))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let inbox = self.inbox_of(follower)?;

        tracing::info!(subject = %subject.id, follower = %follower.id, "Queueing Reject delivery");
        self.queue_to_inboxes(&subject.id, entity, vec![inbox]).await
    }

    async fn queue_undo_follow(
        &self,
        follower: &user::Model,
        followee: &user::Model,
    ) -> AppResult<()> {
        let entity = serde_json::to_value(self.builder.build_undo_follow(follower, followee))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let inbox = self.inbox_of(followee)?;

        tracing::info!(follower = %follower.id, followee = %followee.id, "Queueing Undo delivery");
        self.queue_to_inboxes(&follower.id, entity, vec![inbox]).await
    }

    async fn queue_delete(
        &self,
        author: &user::Model,
        inboxes: Vec<String>,
        entity: Value,
    ) -> AppResult<()> {
        tracing::info!(
            author = %author.id,
            inbox_count = inboxes.len(),
            "Queueing Delete delivery"
        );
        self.queue_to_inboxes(&author.id, entity, inboxes).await
    }

    async fn queue_fan_out(
        &self,
        author_id: &str,
        inboxes: Vec<String>,
        entity: Value,
    ) -> AppResult<()> {
        tracing::info!(
            author = %author_id,
            inbox_count = inboxes.len(),
            "Queueing entity fan-out"
        );
        self.queue_to_inboxes(author_id, entity, inboxes).await
    }
}

#[async_trait]
impl InboxQueue for RedisDeliveryService {
    async fn enqueue_inbox(&self, request: InboxRequest) -> AppResult<()> {
        self.inbox_storage
            .clone()
            .push(InboxJob::from(request))
            .await
            .map_err(|e| AppError::Queue(format!("Failed to queue inbound entity: {e}")))?;
        Ok(())
    }
}
