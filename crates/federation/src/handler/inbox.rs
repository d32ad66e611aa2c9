//! Inbox endpoint.
//!
//! The handler does no verification of its own: it captures the raw body
//! and the claimed signature headers, enqueues a durable job, and always
//! acknowledges with 200 once the job is stored. Authentication, clock skew
//! and dispatch happen in the inbox workers, so a misbehaving sender learns
//! nothing from the response.

use async_trait::async_trait;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use versia_common::{AppResult, http_signature::SignatureHeaders};

/// A captured inbound request, ready for durable queueing.
#[derive(Debug, Clone)]
pub struct InboxRequest {
    /// Raw request body, byte-exact as received.
    pub body: Vec<u8>,
    /// The claimed `versia-*` signature headers, when all three were sent.
    pub signature: Option<SignatureHeaders>,
    /// Legacy `authorization` header, accepted as a compatibility path.
    pub authorization: Option<String>,
    /// Request method, for signature recomputation.
    pub method: String,
    /// Request path, for signature recomputation.
    pub path: String,
    /// When the request arrived.
    pub received_at: DateTime<Utc>,
}

/// Durable queue the inbox hands captured requests to.
///
/// Implemented by the queue crate; the handler only depends on this seam.
#[async_trait]
pub trait InboxQueue: Send + Sync {
    /// Persist an inbound request for asynchronous processing.
    async fn enqueue_inbox(&self, request: InboxRequest) -> AppResult<()>;
}

/// State for the inbox handler.
#[derive(Clone)]
pub struct InboxState {
    /// The durable queue behind the endpoint.
    pub queue: Arc<dyn InboxQueue>,
}

/// Handle `POST /inbox`.
pub async fn inbox_handler(
    State(state): State<InboxState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut header_map = HashMap::new();
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_lowercase(), value.to_string());
        }
    }

    let request = InboxRequest {
        body: body.to_vec(),
        signature: SignatureHeaders::from_map(&header_map),
        authorization: header_map.get("authorization").cloned(),
        method: "POST".to_string(),
        path: uri.path().to_string(),
        received_at: Utc::now(),
    };

    debug!(
        path = %request.path,
        signed = request.signature.is_some(),
        bytes = request.body.len(),
        "Inbound entity received"
    );

    match state.queue.enqueue_inbox(request).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "accepted"}))).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use versia_common::http_signature::{SIGNATURE_HEADER, SIGNED_AT_HEADER, SIGNED_BY_HEADER};

    #[derive(Default)]
    struct CapturingQueue {
        captured: Mutex<Option<InboxRequest>>,
    }

    #[async_trait]
    impl InboxQueue for CapturingQueue {
        async fn enqueue_inbox(&self, request: InboxRequest) -> AppResult<()> {
            *self.captured.lock().unwrap() = Some(request);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_inbox_enqueues_and_acknowledges() {
        let queue = Arc::new(CapturingQueue::default());
        let state = InboxState {
            queue: queue.clone(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "c2ln".parse().unwrap());
        headers.insert(SIGNED_AT_HEADER, "1700000000".parse().unwrap());
        headers.insert(
            SIGNED_BY_HEADER,
            "https://remote.example/users/bob".parse().unwrap(),
        );

        let response = inbox_handler(
            State(state),
            Uri::from_static("/inbox"),
            headers,
            Bytes::from_static(br#"{"type":"Follow"}"#),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);

        let captured = queue.captured.lock().unwrap().take().unwrap();
        assert_eq!(captured.path, "/inbox");
        assert_eq!(captured.body, br#"{"type":"Follow"}"#);
        let signature = captured.signature.unwrap();
        assert_eq!(signature.signed_at, 1_700_000_000);
        assert_eq!(signature.signed_by, "https://remote.example/users/bob");
    }

    #[tokio::test]
    async fn test_inbox_accepts_unsigned_with_legacy_authorization() {
        let queue = Arc::new(CapturingQueue::default());
        let state = InboxState {
            queue: queue.clone(),
        };

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer legacy-token".parse().unwrap());

        let response = inbox_handler(
            State(state),
            Uri::from_static("/inbox"),
            headers,
            Bytes::from_static(b"{}"),
        )
        .await;

        // Still 200: authentication policy is the worker's job
        assert_eq!(response.status(), StatusCode::OK);

        let captured = queue.captured.lock().unwrap().take().unwrap();
        assert!(captured.signature.is_none());
        assert_eq!(captured.authorization.as_deref(), Some("Bearer legacy-token"));
    }
}
