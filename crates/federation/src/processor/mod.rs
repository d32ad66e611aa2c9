//! Inbound entity processors.
//!
//! Each processor applies one entity type to local state. All of them are
//! idempotent keyed on the entity URI: the queue delivers at least once, so
//! a processor seeing the same entity twice must change nothing the second
//! time.

mod accept;
mod delete;
mod follow;
mod note;
mod undo;
mod update;

pub use accept::{AcceptProcessor, RejectProcessor};
pub use delete::DeleteProcessor;
pub use follow::FollowProcessor;
pub use note::{LikeProcessor, NoteProcessor};
pub use undo::UndoProcessor;
pub use update::{InstanceMetadataProcessor, UserUpdateProcessor};

use crate::entity::Entity;
use crate::resolver::EntityResolver;
use tracing::{info, warn};
use url::Url;
use versia_common::{AppError, AppResult};
use versia_core::RelationshipService;
use versia_db::{
    entities::user,
    repositories::{NotificationRepository, UserRepository},
};

/// Everything the per-type processors need, bundled for the inbox workers.
#[derive(Clone)]
pub struct ProcessorContext {
    pub relationships: RelationshipService,
    pub resolver: EntityResolver,
    pub users: UserRepository,
    pub notifications: NotificationRepository,
    pub base_url: Url,
}

impl ProcessorContext {
    /// Look up the local user a federation entity addresses by URI.
    pub(crate) async fn local_user(&self, uri: &str) -> AppResult<user::Model> {
        if let Some(id) = local_user_id_from_uri(&self.base_url, uri)
            && let Some(found) = self.users.find_by_id(&id).await?
            && found.is_local()
        {
            return Ok(found);
        }
        Err(AppError::MalformedEntity(format!(
            "{uri} is not an actor on this instance"
        )))
    }
}

/// Extract the user id from a local actor URI, `None` for foreign URIs.
fn local_user_id_from_uri(base_url: &Url, uri: &str) -> Option<String> {
    let prefix = format!("{base_url}users/");
    let rest = uri.strip_prefix(&prefix)?;
    rest.split('/').next().map(ToString::to_string)
}

/// Dispatch a verified entity to its processor.
///
/// Unknown types complete successfully: newer remote software must not be
/// able to wedge the queue.
pub async fn process_entity(ctx: &ProcessorContext, entity: Entity) -> AppResult<()> {
    info!(entity_type = entity.kind(), uri = ?entity.uri(), "Processing entity");

    match entity {
        Entity::Follow(follow) => {
            FollowProcessor::new(ctx.clone()).process(&follow).await.map(|_| ())
        }
        Entity::Accept(accept) => {
            AcceptProcessor::new(ctx.clone()).process(&accept).await
        }
        Entity::Reject(reject) => {
            RejectProcessor::new(ctx.clone()).process(&reject).await
        }
        Entity::Undo(undo) => UndoProcessor::new(ctx.clone()).process(&undo).await,
        Entity::Delete(delete) => DeleteProcessor::new(ctx.clone()).process(&delete).await,
        Entity::Note(note) => NoteProcessor::new(ctx.clone()).process(&note).await,
        Entity::Like(like) => LikeProcessor::new(ctx.clone()).process(&like).await,
        Entity::User(doc) => UserUpdateProcessor::new(ctx.clone()).process(doc).await,
        Entity::InstanceMetadata(metadata) => {
            InstanceMetadataProcessor::new(ctx.clone()).process(metadata).await
        }
        Entity::Unknown => {
            warn!("Unknown entity type, acknowledged and dropped");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_user_id_from_uri() {
        let base = Url::parse("https://local.example/").unwrap();

        assert_eq!(
            local_user_id_from_uri(&base, "https://local.example/users/u1"),
            Some("u1".to_string())
        );
        assert_eq!(
            local_user_id_from_uri(&base, "https://local.example/users/u1/inbox"),
            Some("u1".to_string())
        );
        assert_eq!(
            local_user_id_from_uri(&base, "https://remote.example/users/u1"),
            None
        );
    }
}
