//! Inbound Undo processing.

use crate::entity::UndoEntity;
use crate::processor::ProcessorContext;
use tracing::{debug, info};
use versia_common::{AppError, AppResult};
use versia_db::entities::notification::NotificationKind;

/// Applies an inbound Undo: a remote actor retracts an earlier entity.
///
/// The retracted entity is located through the notification it caused,
/// keyed on its URI. An Undo arriving before its target Follow is a
/// retryable miss, not a dead letter.
pub struct UndoProcessor {
    ctx: ProcessorContext,
}

impl UndoProcessor {
    /// Create a new undo processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process an Undo entity.
    pub async fn process(&self, entity: &UndoEntity) -> AppResult<()> {
        let author = self.ctx.resolver.resolve_actor(&entity.author, false).await?;

        let Some(caused) = self.ctx.notifications.find_by_entity_uri(&entity.undone).await? else {
            return Err(AppError::MissingAntecedent(entity.undone.clone()));
        };

        match caused.kind {
            NotificationKind::Follow | NotificationKind::FollowRequest => {
                // Only the original follower may retract their follow.
                if caused.actor_id != author.id {
                    return Err(AppError::Forbidden(format!(
                        "Undo author does not own {}",
                        entity.undone
                    )));
                }

                match self
                    .ctx
                    .relationships
                    .unfollow(&caused.actor_id, &caused.user_id)
                    .await
                {
                    Ok(()) | Err(AppError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }

                self.ctx.notifications.delete_by_entity_uri(&entity.undone).await?;
                info!(
                    follower = %caused.actor_id,
                    followee = %caused.user_id,
                    "Undo(Follow) processed"
                );
            }
            NotificationKind::FollowAccepted => {
                debug!(uri = %entity.undone, "Undo targets an Accept, nothing to retract");
            }
        }

        Ok(())
    }
}
