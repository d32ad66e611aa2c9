//! Federation request handlers.

mod inbox;
mod instance;
mod user;
mod webfinger;

pub use inbox::{InboxQueue, InboxRequest, InboxState, inbox_handler};
pub use instance::{InstanceMetadataState, instance_metadata_handler};
pub use user::{ActorState, actor_handler};
pub use webfinger::{WebfingerLink, WebfingerResponse, WebfingerState, webfinger_handler};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use serde_json::Value;
use versia_common::http_signature::sign_request;

/// Serialize a document and attach the responder's signature headers.
///
/// Response signatures bind to the GET that produced them: lowercased
/// method, the requested path, the responder's timestamp, and the digest of
/// the empty request body.
fn signed_json_response(
    signing_key: &SigningKey,
    signed_by: &str,
    path: &str,
    document: &Value,
) -> Response {
    let headers = sign_request(signing_key, signed_by, "GET", path, b"", Utc::now());

    let mut response = (
        StatusCode::OK,
        [("content-type", "application/json")],
        document.to_string(),
    )
        .into_response();

    for (name, value) in headers.to_pairs() {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name, value);
        }
    }
    response
}
