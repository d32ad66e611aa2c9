//! Inbound Delete processing.

use crate::entity::DeleteEntity;
use crate::processor::ProcessorContext;
use tracing::{debug, info, warn};
use versia_common::{AppError, AppResult};

/// Applies an inbound Delete tombstone.
pub struct DeleteProcessor {
    ctx: ProcessorContext,
}

impl DeleteProcessor {
    /// Create a new delete processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process a Delete entity.
    ///
    /// A `User` tombstone removes the cached remote actor. Deleting an
    /// already-absent target is a success: tombstones are redelivered.
    pub async fn process(&self, entity: &DeleteEntity) -> AppResult<()> {
        match entity.deleted_type.as_str() {
            "User" => self.delete_user(entity).await,
            "Note" => {
                // No note storage here; acknowledge so the sender stops.
                debug!(uri = %entity.deleted, "Note tombstone acknowledged");
                Ok(())
            }
            other => {
                warn!(deleted_type = other, "Delete for unsupported type, dropped");
                Ok(())
            }
        }
    }

    async fn delete_user(&self, entity: &DeleteEntity) -> AppResult<()> {
        // Self-deletion only: the author must be the deleted actor, unless
        // the sending instance tombstones on behalf of a gone account.
        if entity
            .author
            .as_deref()
            .is_some_and(|author| author != entity.deleted)
        {
            return Err(AppError::Forbidden(format!(
                "Delete author does not own {}",
                entity.deleted
            )));
        }

        let Some(user) = self.ctx.users.find_by_uri(&entity.deleted).await? else {
            debug!(uri = %entity.deleted, "User tombstone for unknown actor, dropped");
            return Ok(());
        };

        if user.is_local() {
            return Err(AppError::Forbidden(
                "Remote Delete cannot remove a local actor".to_string(),
            ));
        }

        self.ctx.users.delete(&user.id).await?;
        info!(user_id = %user.id, uri = %entity.deleted, "Deleted remote actor");
        Ok(())
    }
}
