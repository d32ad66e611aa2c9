//! Inbound Accept and Reject processing.
//!
//! Both answer a Follow this instance previously sent: the remote author is
//! the followee, the named follower is local.

use crate::entity::{AcceptEntity, RejectEntity};
use crate::processor::ProcessorContext;
use tracing::{debug, info};
use versia_common::{AppError, AppResult};

/// Applies an inbound Accept: a remote followee approved a local follow.
pub struct AcceptProcessor {
    ctx: ProcessorContext,
}

impl AcceptProcessor {
    /// Create a new accept processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process an Accept entity.
    ///
    /// A redelivered Accept for an already-following pair is a no-op inside
    /// the state machine; an Accept with no matching request is dropped.
    pub async fn process(&self, entity: &AcceptEntity) -> AppResult<()> {
        let subject = self.ctx.resolver.resolve_actor(&entity.author, false).await?;
        let follower = self.ctx.local_user(&entity.follower).await?;

        match self
            .ctx
            .relationships
            .accept_follow(&subject.id, &follower.id, Some(&entity.uri))
            .await
        {
            Ok(()) => {
                info!(subject = %subject.id, follower = %follower.id, "Accept processed");
                Ok(())
            }
            Err(AppError::NotFound(_)) => {
                debug!(uri = %entity.uri, "Accept without a matching request, dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Applies an inbound Reject: a remote followee declined a local follow.
pub struct RejectProcessor {
    ctx: ProcessorContext,
}

impl RejectProcessor {
    /// Create a new reject processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process a Reject entity.
    pub async fn process(&self, entity: &RejectEntity) -> AppResult<()> {
        let subject = self.ctx.resolver.resolve_actor(&entity.author, false).await?;
        let follower = self.ctx.local_user(&entity.follower).await?;

        match self
            .ctx
            .relationships
            .reject_follow(&subject.id, &follower.id)
            .await
        {
            Ok(()) => {
                info!(subject = %subject.id, follower = %follower.id, "Reject processed");
                Ok(())
            }
            Err(AppError::NotFound(_)) => {
                debug!(uri = %entity.uri, "Reject without a matching request, dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
