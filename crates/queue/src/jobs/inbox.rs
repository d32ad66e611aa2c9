//! Inbound entity processing job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use versia_common::http_signature::SignatureHeaders;
use versia_federation::InboxRequest;

/// Job to authenticate and process one captured inbound request.
///
/// Carries the raw body rather than parsed JSON: the signature covers the
/// bytes as received, so re-serialization before verification would break it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxJob {
    /// Raw request body, byte-exact as received.
    pub body: Vec<u8>,

    /// Claimed `versia-signature` value, if the request was signed.
    pub signature: Option<String>,

    /// Claimed `versia-signed-at` value, unix seconds.
    pub signed_at: Option<i64>,

    /// Claimed `versia-signed-by` value.
    pub signed_by: Option<String>,

    /// Legacy `authorization` header, accepted as a compatibility path.
    pub authorization: Option<String>,

    /// Request method the signature was computed over.
    pub method: String,

    /// Request path the signature was computed over.
    pub path: String,

    /// When the endpoint received the request.
    pub received_at: DateTime<Utc>,

    /// Completed attempts. Each retry is queued as a fresh job carrying the
    /// incremented count, which drives the backoff delay.
    #[serde(default)]
    pub attempts: u32,
}

impl InboxJob {
    /// Copy of this job queued for the next attempt.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempts: self.attempts + 1,
            ..self.clone()
        }
    }

    /// Reassemble the signature headers, when all three were present.
    #[must_use]
    pub fn signature_headers(&self) -> Option<SignatureHeaders> {
        Some(SignatureHeaders {
            signature: self.signature.clone()?,
            signed_at: self.signed_at?,
            signed_by: self.signed_by.clone()?,
        })
    }
}

impl From<InboxRequest> for InboxJob {
    fn from(request: InboxRequest) -> Self {
        let (signature, signed_at, signed_by) = match request.signature {
            Some(headers) => (
                Some(headers.signature),
                Some(headers.signed_at),
                Some(headers.signed_by),
            ),
            None => (None, None, None),
        };

        Self {
            body: request.body,
            signature,
            signed_at,
            signed_by,
            authorization: request.authorization,
            method: request.method,
            path: request.path,
            received_at: request.received_at,
            attempts: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_job_round_trips_the_signature() {
        let request = InboxRequest {
            body: b"{}".to_vec(),
            signature: Some(SignatureHeaders {
                signature: "c2ln".to_string(),
                signed_at: 1_700_000_000,
                signed_by: "https://remote.example/users/bob".to_string(),
            }),
            authorization: None,
            method: "POST".to_string(),
            path: "/inbox".to_string(),
            received_at: Utc::now(),
        };

        let job = InboxJob::from(request);
        let headers = job.signature_headers().unwrap();
        assert_eq!(headers.signed_at, 1_700_000_000);
        assert_eq!(headers.signed_by, "https://remote.example/users/bob");
    }

    #[test]
    fn test_unsigned_job_has_no_headers() {
        let request = InboxRequest {
            body: b"{}".to_vec(),
            signature: None,
            authorization: Some("Bearer token".to_string()),
            method: "POST".to_string(),
            path: "/inbox".to_string(),
            received_at: Utc::now(),
        };

        let job = InboxJob::from(request);
        assert!(job.signature_headers().is_none());
        assert_eq!(job.authorization.as_deref(), Some("Bearer token"));
    }

    #[test]
    fn test_attempt_counter_starts_at_zero_and_increments() {
        let request = InboxRequest {
            body: b"{}".to_vec(),
            signature: None,
            authorization: Some("Bearer token".to_string()),
            method: "POST".to_string(),
            path: "/inbox".to_string(),
            received_at: Utc::now(),
        };

        let job = InboxJob::from(request);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.next_attempt().attempts, 1);

        // Payloads queued before the counter existed still deserialize
        let payload = serde_json::json!({
            "body": [],
            "signature": null,
            "signed_at": null,
            "signed_by": null,
            "authorization": "Bearer token",
            "method": "POST",
            "path": "/inbox",
            "received_at": Utc::now(),
        });
        let old: InboxJob = serde_json::from_value(payload).unwrap();
        assert_eq!(old.attempts, 0);
    }
}
