//! WebFinger handler for local actor discovery.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;
use versia_db::repositories::UserRepository;

/// WebFinger query parameters.
#[derive(Debug, Deserialize)]
pub struct WebfingerQuery {
    pub resource: String,
}

/// WebFinger JRD response.
#[derive(Debug, Serialize)]
pub struct WebfingerResponse {
    pub subject: String,
    pub aliases: Vec<String>,
    pub links: Vec<WebfingerLink>,
}

/// A JRD link.
#[derive(Debug, Serialize)]
pub struct WebfingerLink {
    pub rel: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// State for the WebFinger handler.
#[derive(Clone)]
pub struct WebfingerState {
    /// The host this instance answers for.
    pub domain: String,
    /// Public base URL actor URIs are rooted at.
    pub base_url: Url,
    pub user_repo: UserRepository,
}

/// Parse an `acct:user@host` resource.
fn parse_resource(resource: &str) -> Option<(String, String)> {
    let stripped = resource.strip_prefix("acct:")?;
    let mut parts = stripped.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(username), Some(host)) if !username.is_empty() && !host.is_empty() => {
            Some((username.to_string(), host.to_string()))
        }
        _ => None,
    }
}

/// Handle `GET /.well-known/webfinger?resource=acct:user@host`.
///
/// Serves discovery for local actors only; lookups for other hosts are 404.
pub async fn webfinger_handler(
    State(state): State<WebfingerState>,
    Query(query): Query<WebfingerQuery>,
) -> Response {
    info!(resource = %query.resource, "WebFinger lookup");

    let Some((username, host)) = parse_resource(&query.resource) else {
        return (StatusCode::BAD_REQUEST, "Invalid resource format").into_response();
    };

    if host != state.domain {
        return (StatusCode::NOT_FOUND, "Unknown domain").into_response();
    }

    let user = match state.user_repo.find_local_by_username(&username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            info!(username = %username, "User not found for WebFinger");
            return (StatusCode::NOT_FOUND, "User not found").into_response();
        }
        Err(e) => {
            warn!(error = %e, "Database error during WebFinger lookup");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    if user.is_suspended {
        return (StatusCode::GONE, "User is suspended").into_response();
    }

    let actor_url = format!("{}users/{}", state.base_url, user.id);

    let response = WebfingerResponse {
        subject: query.resource,
        aliases: vec![
            actor_url.clone(),
            format!("{}@{}", state.base_url, user.username),
        ],
        links: vec![
            WebfingerLink {
                rel: "self".to_string(),
                link_type: Some("application/json".to_string()),
                href: Some(actor_url),
            },
            WebfingerLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                link_type: Some("text/html".to_string()),
                href: Some(format!("{}@{}", state.base_url, user.username)),
            },
        ],
    };

    (
        StatusCode::OK,
        [("content-type", "application/jrd+json")],
        Json(response),
    )
        .into_response()
}
