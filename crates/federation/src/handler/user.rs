//! Actor document handler.

use crate::entity::EntityBuilder;
use crate::handler::signed_json_response;
use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::warn;
use versia_common::crypto;
use versia_db::repositories::UserRepository;

/// State for the actor document handler.
#[derive(Clone)]
pub struct ActorState {
    pub user_repo: UserRepository,
    pub builder: EntityBuilder,
}

/// Handle `GET /users/{id}`.
///
/// Serves the actor document for a local user, signed with that user's own
/// key so fetchers can verify the response against the key it advertises.
pub async fn actor_handler(
    State(state): State<ActorState>,
    Path(id): Path<String>,
    uri: Uri,
) -> Response {
    let user = match state.user_repo.find_by_id(&id).await {
        Ok(Some(user)) => user,
        Ok(None) => return (StatusCode::NOT_FOUND, "User not found").into_response(),
        Err(e) => {
            warn!(error = %e, "Database error during actor lookup");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    // Remote actors are served by their own instance.
    if user.is_remote() {
        return (StatusCode::NOT_FOUND, "User not found").into_response();
    }
    if user.is_suspended {
        return (StatusCode::GONE, "User is suspended").into_response();
    }

    let Some(encoded_key) = user.private_key.as_deref() else {
        warn!(user_id = %user.id, "Local user has no private key");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Key unavailable").into_response();
    };
    let signing_key = match crypto::parse_signing_key(encoded_key) {
        Ok(key) => key,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Failed to parse signing key");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Key unavailable").into_response();
        }
    };

    let signed_by = state.builder.actor_uri(&user);
    let document = match serde_json::to_value(state.builder.build_user(&user)) {
        Ok(value) => value,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Failed to serialize actor document");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Serialization failed").into_response();
        }
    };

    signed_json_response(&signing_key, &signed_by, uri.path(), &document)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;
    use url::Url;
    use versia_common::crypto::generate_keypair;
    use versia_common::http_signature::SIGNATURE_HEADER;
    use versia_db::entities::user;

    fn state(db: Arc<sea_orm::DatabaseConnection>) -> ActorState {
        ActorState {
            user_repo: UserRepository::new(db),
            builder: EntityBuilder::new(Url::parse("https://local.example/").unwrap()),
        }
    }

    #[tokio::test]
    async fn test_actor_document_is_signed() {
        let keypair = generate_keypair();
        let alice = user::Model {
            id: "u1".to_string(),
            username: "alice".to_string(),
            username_lower: "alice".to_string(),
            host: None,
            uri: None,
            inbox: None,
            shared_inbox: None,
            public_key: keypair.public_key,
            private_key: Some(keypair.private_key),
            name: None,
            description: None,
            avatar_url: None,
            banner_url: None,
            is_locked: false,
            is_suspended: false,
            followers_count: 0,
            following_count: 0,
            last_fetched_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[alice]])
                .into_connection(),
        );

        let response = actor_handler(
            State(state(db)),
            Path("u1".to_string()),
            Uri::from_static("/users/u1"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SIGNATURE_HEADER));
    }

    #[tokio::test]
    async fn test_unknown_actor_is_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        let response = actor_handler(
            State(state(db)),
            Path("missing".to_string()),
            Uri::from_static("/users/missing"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
