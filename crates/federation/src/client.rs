//! Signed HTTP client for federation traffic.
//!
//! All outbound requests carry the three `versia-*` signature headers.
//! Deliveries additionally carry `Origin` so the receiver can attribute the
//! request to a host before resolving the signer.

use chrono::Utc;
use ed25519_dalek::{SigningKey, VerifyingKey};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use versia_common::{
    AppError, AppResult,
    http_signature::{SignatureHeaders, sign_request, verify_request},
};

/// A fetched remote document together with the response signature, kept so
/// the caller can verify it once the responder's key is known.
#[derive(Debug)]
pub struct FetchedDocument {
    /// Parsed JSON body.
    pub value: Value,
    /// The request path the responder signed over.
    pub path: String,
    /// Response signature headers, when the responder sent them.
    pub signature: Option<SignatureHeaders>,
}

impl FetchedDocument {
    /// Verify the response signature against a key.
    ///
    /// Response signatures are bound to the GET: lowercased method, the
    /// requested path, the responder's timestamp, and the digest of the
    /// empty request body. Absent signature headers verify as `false`.
    #[must_use]
    pub fn verify(&self, key: &VerifyingKey) -> bool {
        self.signature
            .as_ref()
            .is_some_and(|sig| verify_request(key, sig, "GET", &self.path, b""))
    }
}

/// HTTP client for signed fetches, WebFinger lookups, and inbox deliveries.
#[derive(Clone)]
pub struct FederationClient {
    client: Client,
    user_agent: String,
    origin: String,
}

impl FederationClient {
    /// Create a new client identifying as this instance.
    pub fn new(base_url: &Url, request_timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        let origin = base_url.host_str().unwrap_or_default().to_string();
        let user_agent = format!("versia-rs/{} (+{base_url})", env!("CARGO_PKG_VERSION"));

        Ok(Self {
            client,
            user_agent,
            origin,
        })
    }

    /// Fetch a remote JSON document with a signed GET.
    ///
    /// `signed_by` identifies the key the receiver should verify against:
    /// an actor URI or the `"instance <host>"` form.
    pub async fn signed_fetch(
        &self,
        url: &Url,
        signing_key: &SigningKey,
        signed_by: &str,
    ) -> AppResult<FetchedDocument> {
        let path = url.path().to_string();
        let headers = sign_request(signing_key, signed_by, "GET", &path, b"", Utc::now());

        debug!(url = %url, "Fetching remote document");

        let mut request = self
            .client
            .get(url.clone())
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json");
        for (name, value) in headers.to_pairs() {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ResolutionUnreachable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(AppError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(AppError::ResolutionUnreachable(format!(
                "{url} returned status {status}"
            )));
        }

        let signature = Self::response_signature(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::ResolutionUnreachable(e.to_string()))?;
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| AppError::MalformedEntity(format!("{url}: {e}")))?;

        Ok(FetchedDocument {
            value,
            path,
            signature,
        })
    }

    /// Resolve `user@host` to the actor's canonical URI via WebFinger.
    pub async fn webfinger(&self, username: &str, host: &str) -> AppResult<Url> {
        let acct = format!("{username}@{host}");
        let url = format!("https://{host}/.well-known/webfinger?resource=acct:{acct}");

        debug!(acct = %acct, "WebFinger lookup");

        let response = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/jrd+json, application/json")
            .send()
            .await
            .map_err(|e| AppError::ResolutionUnreachable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(AppError::ActorNotFound(acct));
        }
        if !status.is_success() {
            return Err(AppError::ResolutionUnreachable(format!(
                "WebFinger for {acct} returned status {status}"
            )));
        }

        let jrd: Value = response
            .json()
            .await
            .map_err(|e| AppError::MalformedEntity(format!("WebFinger for {acct}: {e}")))?;

        self_link(&jrd)
            .ok_or_else(|| AppError::MalformedEntity(format!("WebFinger for {acct} has no self link")))
    }

    /// Deliver an entity to a remote inbox with a signed POST.
    ///
    /// 2xx is success; 410 means the recipient is gone and delivery should
    /// stop; any other 4xx is a permanent rejection; 5xx and network
    /// failures are retryable.
    pub async fn deliver(
        &self,
        signing_key: &SigningKey,
        signed_by: &str,
        inbox: &Url,
        entity: &Value,
    ) -> AppResult<()> {
        let body = serde_json::to_vec(entity)
            .map_err(|e| AppError::Internal(format!("Failed to serialize entity: {e}")))?;
        let path = inbox.path().to_string();
        let headers = sign_request(signing_key, signed_by, "POST", &path, &body, Utc::now());

        debug!(inbox = %inbox, "Delivering entity");

        let mut request = self
            .client
            .post(inbox.clone())
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", "application/json")
            .header("Origin", &self.origin);
        for (name, value) in headers.to_pairs() {
            request = request.header(name, value);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::DeliveryUnreachable(e.to_string()))?;

        let status = response.status().as_u16();
        match classify_delivery_status(status) {
            DeliveryOutcome::Delivered => {
                info!(inbox = %inbox, status = status, "Entity delivered");
                Ok(())
            }
            DeliveryOutcome::RecipientGone => {
                warn!(inbox = %inbox, "Recipient gone (410), dropping delivery");
                Ok(())
            }
            DeliveryOutcome::Rejected => Err(AppError::DeliveryRejected { status }),
            DeliveryOutcome::Unreachable => Err(AppError::DeliveryUnreachable(format!(
                "{inbox} returned status {status}"
            ))),
        }
    }

    fn response_signature(headers: &reqwest::header::HeaderMap) -> Option<SignatureHeaders> {
        let mut map = HashMap::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                map.insert(name.as_str().to_lowercase(), value.to_string());
            }
        }
        SignatureHeaders::from_map(&map)
    }
}

/// How a delivery response status is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryOutcome {
    Delivered,
    RecipientGone,
    Rejected,
    Unreachable,
}

const fn classify_delivery_status(status: u16) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Delivered,
        410 => DeliveryOutcome::RecipientGone,
        400..=499 => DeliveryOutcome::Rejected,
        _ => DeliveryOutcome::Unreachable,
    }
}

/// The `rel == "self"` link of a WebFinger JRD document.
fn self_link(jrd: &Value) -> Option<Url> {
    jrd.get("links")?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("self"))
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
        .and_then(|href| Url::parse(href).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivery_status_classification() {
        assert_eq!(classify_delivery_status(200), DeliveryOutcome::Delivered);
        assert_eq!(classify_delivery_status(202), DeliveryOutcome::Delivered);
        assert_eq!(classify_delivery_status(410), DeliveryOutcome::RecipientGone);
        assert_eq!(classify_delivery_status(403), DeliveryOutcome::Rejected);
        assert_eq!(classify_delivery_status(422), DeliveryOutcome::Rejected);
        assert_eq!(classify_delivery_status(500), DeliveryOutcome::Unreachable);
        assert_eq!(classify_delivery_status(503), DeliveryOutcome::Unreachable);
    }

    #[test]
    fn test_self_link_extraction() {
        let jrd = json!({
            "subject": "acct:alice@remote.example",
            "links": [
                {"rel": "http://webfinger.net/rel/profile-page", "href": "https://remote.example/@alice"},
                {"rel": "self", "type": "application/json", "href": "https://remote.example/users/alice"},
            ]
        });

        let link = self_link(&jrd).unwrap();
        assert_eq!(link.as_str(), "https://remote.example/users/alice");
    }

    #[test]
    fn test_self_link_missing() {
        let jrd = json!({"subject": "acct:alice@remote.example", "links": []});
        assert!(self_link(&jrd).is_none());
    }

    #[test]
    fn test_fetched_document_verifies_response_signature() {
        use versia_common::crypto::{generate_keypair, parse_signing_key, parse_verifying_key};

        let keypair = generate_keypair();
        let signing = parse_signing_key(&keypair.private_key).unwrap();
        let verifying = parse_verifying_key(&keypair.public_key).unwrap();

        let path = "/users/alice".to_string();
        let signature = sign_request(
            &signing,
            "https://remote.example/users/alice",
            "GET",
            &path,
            b"",
            Utc::now(),
        );

        let doc = FetchedDocument {
            value: json!({}),
            path,
            signature: Some(signature),
        };
        assert!(doc.verify(&verifying));

        let other = generate_keypair();
        let other_key = parse_verifying_key(&other.public_key).unwrap();
        assert!(!doc.verify(&other_key));
    }
}
