//! Inbound Note and Like processing.
//!
//! Content storage lives outside this engine. These processors resolve the
//! author, which keeps the actor cache warm and validates the sender, and
//! acknowledge the payload.

use crate::entity::{LikeEntity, NoteEntity};
use crate::processor::ProcessorContext;
use tracing::info;
use versia_common::AppResult;

/// Acknowledges an inbound Note after resolving its author.
pub struct NoteProcessor {
    ctx: ProcessorContext,
}

impl NoteProcessor {
    /// Create a new note processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process a Note entity.
    pub async fn process(&self, entity: &NoteEntity) -> AppResult<()> {
        let author = self.ctx.resolver.resolve_actor(&entity.author, false).await?;
        info!(uri = %entity.uri, author = %author.id, "Note received");
        Ok(())
    }
}

/// Acknowledges an inbound Like after resolving its author.
pub struct LikeProcessor {
    ctx: ProcessorContext,
}

impl LikeProcessor {
    /// Create a new like processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process a Like entity.
    pub async fn process(&self, entity: &LikeEntity) -> AppResult<()> {
        let author = self.ctx.resolver.resolve_actor(&entity.author, false).await?;
        info!(uri = %entity.uri, author = %author.id, liked = %entity.liked, "Like received");
        Ok(())
    }
}
