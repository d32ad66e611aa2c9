//! Inbound profile and instance metadata updates.

use crate::entity::{InstanceMetadataEntity, UserEntity};
use crate::processor::ProcessorContext;
use tracing::info;
use url::Url;
use versia_common::{AppError, AppResult};

/// Applies an inbound `User` entity, refreshing the cached remote actor.
pub struct UserUpdateProcessor {
    ctx: ProcessorContext,
}

impl UserUpdateProcessor {
    /// Create a new user update processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process a User entity.
    ///
    /// Upserts through the same path the resolver's fetch uses, so a pushed
    /// update and a pulled refresh converge on identical rows. Documents
    /// claiming a local URI are rejected.
    pub async fn process(&self, doc: UserEntity) -> AppResult<()> {
        let host = Url::parse(&doc.uri)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string))
            .ok_or_else(|| AppError::MalformedEntity(format!("Actor URI {}", doc.uri)))?;

        if Some(host.as_str()) == self.ctx.base_url.host_str() {
            return Err(AppError::Forbidden(
                "Remote update cannot rewrite a local actor".to_string(),
            ));
        }

        let model = self.ctx.resolver.apply_user_entity(doc).await?;
        info!(user_id = %model.id, "Remote actor profile updated");
        Ok(())
    }
}

/// Applies an inbound `InstanceMetadata` entity.
pub struct InstanceMetadataProcessor {
    ctx: ProcessorContext,
}

impl InstanceMetadataProcessor {
    /// Create a new instance metadata processor.
    #[must_use]
    pub const fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Process an InstanceMetadata entity.
    pub async fn process(&self, metadata: InstanceMetadataEntity) -> AppResult<()> {
        if Some(metadata.host.as_str()) == self.ctx.base_url.host_str() {
            return Err(AppError::Forbidden(
                "Remote update cannot rewrite this instance's metadata".to_string(),
            ));
        }

        let host = metadata.host.clone();
        self.ctx.resolver.apply_instance_metadata(&host, metadata).await?;
        info!(host = %host, "Instance metadata updated");
        Ok(())
    }
}
