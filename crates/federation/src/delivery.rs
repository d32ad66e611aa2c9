//! Outbound delivery dispatch.
//!
//! Signs entities with the sending local actor's key and hands them to the
//! federation client. Retry decisions stay with the caller (the deliver
//! worker): 4xx surfaces as [`versia_common::AppError::DeliveryRejected`]
//! and is final, 5xx and network failures surface as
//! [`versia_common::AppError::DeliveryUnreachable`] and retry with backoff.

use crate::actor::ActorKind;
use crate::client::FederationClient;
use crate::entity::EntityBuilder;
use serde_json::Value;
use tracing::info;
use url::Url;
use versia_common::{AppError, AppResult};
use versia_db::repositories::{RelationshipRepository, UserRepository};

/// Signs and sends entities to remote inboxes.
#[derive(Clone)]
pub struct OutboundDispatcher {
    client: FederationClient,
    builder: EntityBuilder,
    user_repo: UserRepository,
    relationship_repo: RelationshipRepository,
}

impl OutboundDispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub const fn new(
        client: FederationClient,
        builder: EntityBuilder,
        user_repo: UserRepository,
        relationship_repo: RelationshipRepository,
    ) -> Self {
        Self {
            client,
            builder,
            user_repo,
            relationship_repo,
        }
    }

    /// Deliver an entity to one inbox, signed as the given actor.
    ///
    /// Only local actors hold signing keys; a remote actor here is a
    /// programming error.
    pub async fn deliver(
        &self,
        sender: &ActorKind,
        inbox: &str,
        entity: &Value,
    ) -> AppResult<()> {
        let ActorKind::Local { user, signing_key } = sender else {
            return Err(AppError::Internal(
                "Attempted to deliver as a remote actor".to_string(),
            ));
        };

        let inbox = Url::parse(inbox)
            .map_err(|e| AppError::BadRequest(format!("Invalid inbox URL {inbox}: {e}")))?;
        let signed_by = self.builder.actor_uri(user);

        self.client
            .deliver(signing_key, &signed_by, &inbox, entity)
            .await
    }

    /// Remote inboxes of a local user's accepted followers, shared inboxes
    /// preferred and deduplicated.
    pub async fn collect_follower_inboxes(&self, author_id: &str) -> AppResult<Vec<String>> {
        let followers = self.relationship_repo.find_followers(author_id).await?;

        let mut inboxes = Vec::new();
        for edge in followers {
            let Some(follower) = self.user_repo.find_by_id(&edge.owner_id).await? else {
                continue;
            };
            if follower.is_local() {
                continue;
            }
            if let Some(inbox) = self.builder.inbox_for(&follower)
                && !inboxes.contains(&inbox)
            {
                inboxes.push(inbox);
            }
        }

        info!(
            author_id = author_id,
            inbox_count = inboxes.len(),
            "Collected follower inboxes"
        );
        Ok(inboxes)
    }

    /// The entity builder used for outbound payloads.
    #[must_use]
    pub const fn builder(&self) -> &EntityBuilder {
        &self.builder
    }
}
