//! Inbound Follow processing.

use crate::entity::FollowEntity;
use crate::processor::ProcessorContext;
use tracing::info;
use versia_common::AppResult;
use versia_core::FollowResult;

/// Applies an inbound Follow: a remote actor wants to follow a local one.
pub struct FollowProcessor {
    ctx: ProcessorContext,
}

impl FollowProcessor {
    /// Create a new follow processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process a Follow entity.
    ///
    /// The follower is resolved (and cached) first, then the state machine
    /// applies the transition. An unlocked followee answers with a queued
    /// Accept; redelivery re-queues the Accept without a second transition.
    pub async fn process(&self, entity: &FollowEntity) -> AppResult<FollowResult> {
        let follower = self.ctx.resolver.resolve_actor(&entity.author, false).await?;
        let followee = self.ctx.local_user(&entity.followee).await?;

        let result = self
            .ctx
            .relationships
            .handle_inbound_follow(&follower.id, &followee.id, Some(&entity.uri))
            .await?;

        info!(
            follower = %follower.id,
            followee = %followee.id,
            result = ?result,
            "Follow processed"
        );
        Ok(result)
    }
}
