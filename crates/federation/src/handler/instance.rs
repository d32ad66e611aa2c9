//! Instance metadata handler.

use crate::entity::EntityBuilder;
use crate::handler::signed_json_response;
use crate::resolver::InstanceSigner;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;
use versia_common::crypto::encode_verifying_key;

/// State for the instance metadata handler.
#[derive(Clone)]
pub struct InstanceMetadataState {
    pub name: String,
    pub description: Option<String>,
    pub builder: EntityBuilder,
    pub signer: Arc<InstanceSigner>,
}

/// Handle `GET /.well-known/versia`.
///
/// Serves this instance's self-description, signed with the instance key.
pub async fn instance_metadata_handler(
    State(state): State<InstanceMetadataState>,
    uri: Uri,
) -> Response {
    let public_key = encode_verifying_key(&state.signer.signing_key().verifying_key());
    let entity = state.builder.build_instance_metadata(
        state.name.clone(),
        state.description.clone(),
        public_key,
    );

    let document = match serde_json::to_value(entity) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to serialize instance metadata");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Serialization failed").into_response();
        }
    };

    signed_json_response(
        state.signer.signing_key(),
        state.signer.signed_by(),
        uri.path(),
        &document,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use url::Url;
    use versia_common::crypto::{generate_keypair, parse_signing_key};
    use versia_common::http_signature::{SIGNATURE_HEADER, SIGNED_BY_HEADER};

    #[tokio::test]
    async fn test_metadata_signed_by_instance() {
        let keypair = generate_keypair();
        let signer = InstanceSigner::new(
            parse_signing_key(&keypair.private_key).unwrap(),
            "local.example",
        );
        let state = InstanceMetadataState {
            name: "Test Instance".to_string(),
            description: None,
            builder: EntityBuilder::new(Url::parse("https://local.example/").unwrap()),
            signer: Arc::new(signer),
        };

        let response =
            instance_metadata_handler(State(state), Uri::from_static("/.well-known/versia")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SIGNATURE_HEADER));
        assert_eq!(
            response.headers().get(SIGNED_BY_HEADER).unwrap(),
            "instance local.example"
        );
    }
}
