//! HTTP message signatures for the Versia federation protocol.
//!
//! A signed request carries three headers binding the request method, path,
//! a claimed timestamp and the body digest to the sender's Ed25519 key:
//!
//! - `versia-signature`: base64 Ed25519 signature
//! - `versia-signed-at`: unix seconds at signing time
//! - `versia-signed-by`: actor URI or `"instance <host>"`
//!
//! The codec only proves that this exact `(method, path, timestamp, body)`
//! tuple was signed by a key; freshness of the timestamp is judged by the
//! inbox queue, not here.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Header carrying the base64 signature.
pub const SIGNATURE_HEADER: &str = "versia-signature";
/// Header carrying the unix-seconds signing timestamp.
pub const SIGNED_AT_HEADER: &str = "versia-signed-at";
/// Header identifying the signer (actor URI or `"instance <host>"`).
pub const SIGNED_BY_HEADER: &str = "versia-signed-by";

/// The three signature headers of a signed request.
///
/// Transient value only: produced for outbound requests, extracted from
/// inbound ones, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    /// Base64-encoded Ed25519 signature over the signing string.
    pub signature: String,
    /// Claimed signing time, unix seconds.
    pub signed_at: i64,
    /// Claimed signer identity.
    pub signed_by: String,
}

impl SignatureHeaders {
    /// Extract signature headers from a lowercase-keyed header map.
    ///
    /// Returns `None` when any of the three headers is absent or the
    /// timestamp does not parse as an integer.
    #[must_use]
    pub fn from_map(headers: &HashMap<String, String>) -> Option<Self> {
        let signature = headers.get(SIGNATURE_HEADER)?.clone();
        let signed_at = headers.get(SIGNED_AT_HEADER)?.parse::<i64>().ok()?;
        let signed_by = headers.get(SIGNED_BY_HEADER)?.clone();

        Some(Self {
            signature,
            signed_at,
            signed_by,
        })
    }

    /// Render the headers as `(name, value)` pairs for an outbound request.
    #[must_use]
    pub fn to_pairs(&self) -> [(&'static str, String); 3] {
        [
            (SIGNATURE_HEADER, self.signature.clone()),
            (SIGNED_AT_HEADER, self.signed_at.to_string()),
            (SIGNED_BY_HEADER, self.signed_by.clone()),
        ]
    }
}

/// Calculate the base64 SHA-256 digest of a request body.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    BASE64.encode(hash)
}

/// URI-encode a request path, preserving segment separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical signing string.
///
/// Format: `"<lowercased-method> <url-encoded-path> <unix-seconds> <digest>"`.
#[must_use]
pub fn signing_string(method: &str, path: &str, signed_at: i64, digest: &str) -> String {
    format!(
        "{} {} {} {}",
        method.to_lowercase(),
        encode_path(path),
        signed_at,
        digest
    )
}

/// Sign a request, producing the three signature headers.
///
/// `signed_by` is the URI the receiver will resolve to find the matching
/// public key; for local actors it is the actor's canonical URI, for
/// instance-level signatures the literal `"instance <host>"` form.
#[must_use]
pub fn sign_request(
    signing_key: &SigningKey,
    signed_by: &str,
    method: &str,
    path: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> SignatureHeaders {
    let signed_at = now.timestamp();
    let digest = calculate_digest(body);
    let message = signing_string(method, path, signed_at, &digest);

    let signature = signing_key.sign(message.as_bytes());

    SignatureHeaders {
        signature: BASE64.encode(signature.to_bytes()),
        signed_at,
        signed_by: signed_by.to_string(),
    }
}

/// Verify a signed request against a public key.
///
/// Recomputes the signing string from the request as received, using the
/// claimed timestamp from the headers rather than wall-clock time. Returns
/// `false` on any malformed signature or cryptographic mismatch; never
/// errors, never judges freshness.
#[must_use]
pub fn verify_request(
    verifying_key: &VerifyingKey,
    headers: &SignatureHeaders,
    method: &str,
    path: &str,
    body: &[u8],
) -> bool {
    let Ok(signature_bytes) = BASE64.decode(&headers.signature) else {
        return false;
    };
    let Ok(signature_bytes) = <[u8; 64]>::try_from(signature_bytes) else {
        return false;
    };
    let signature = Signature::from_bytes(&signature_bytes);

    let digest = calculate_digest(body);
    let message = signing_string(method, path, headers.signed_at, &digest);

    verifying_key.verify(message.as_bytes(), &signature).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keypair, parse_signing_key, parse_verifying_key};

    fn test_keys() -> (SigningKey, VerifyingKey) {
        let keypair = generate_keypair();
        (
            parse_signing_key(&keypair.private_key).unwrap(),
            parse_verifying_key(&keypair.public_key).unwrap(),
        )
    }

    #[test]
    fn test_signing_string_format() {
        let s = signing_string("POST", "/inbox", 1700000000, "abc123=");
        assert_eq!(s, "post /inbox 1700000000 abc123=");
    }

    #[test]
    fn test_signing_string_encodes_path() {
        let s = signing_string("GET", "/users/caf\u{e9}", 1, "d");
        assert_eq!(s, "get /users/caf%C3%A9 1 d");
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let (signing, verifying) = test_keys();
        let body = br#"{"type":"Follow"}"#;

        let headers = sign_request(
            &signing,
            "https://example.com/users/alice",
            "POST",
            "/inbox",
            body,
            Utc::now(),
        );

        assert!(verify_request(&verifying, &headers, "POST", "/inbox", body));
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let (signing, verifying) = test_keys();
        let headers = sign_request(
            &signing,
            "https://example.com/users/alice",
            "POST",
            "/inbox",
            b"original",
            Utc::now(),
        );

        assert!(!verify_request(
            &verifying,
            &headers,
            "POST",
            "/inbox",
            b"oriGinal"
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_path() {
        let (signing, verifying) = test_keys();
        let body = b"{}";
        let headers = sign_request(
            &signing,
            "https://example.com/users/alice",
            "POST",
            "/inbox",
            body,
            Utc::now(),
        );

        assert!(!verify_request(
            &verifying,
            &headers,
            "POST",
            "/users/alice/inbox",
            body
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_timestamp() {
        let (signing, verifying) = test_keys();
        let body = b"{}";
        let mut headers = sign_request(
            &signing,
            "https://example.com/users/alice",
            "POST",
            "/inbox",
            body,
            Utc::now(),
        );
        headers.signed_at += 1;

        assert!(!verify_request(&verifying, &headers, "POST", "/inbox", body));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let (signing, _) = test_keys();
        let (_, other_verifying) = test_keys();
        let body = b"{}";
        let headers = sign_request(
            &signing,
            "https://example.com/users/alice",
            "POST",
            "/inbox",
            body,
            Utc::now(),
        );

        assert!(!verify_request(
            &other_verifying,
            &headers,
            "POST",
            "/inbox",
            body
        ));
    }

    #[test]
    fn test_verify_rejects_malformed_signature() {
        let (_, verifying) = test_keys();
        let headers = SignatureHeaders {
            signature: "not base64!!!".to_string(),
            signed_at: 1700000000,
            signed_by: "https://example.com/users/alice".to_string(),
        };

        assert!(!verify_request(&verifying, &headers, "POST", "/inbox", b"{}"));
    }

    #[test]
    fn test_from_map_missing_header() {
        let mut headers = HashMap::new();
        headers.insert(SIGNATURE_HEADER.to_string(), "sig".to_string());
        headers.insert(SIGNED_AT_HEADER.to_string(), "1700000000".to_string());

        assert!(SignatureHeaders::from_map(&headers).is_none());
    }

    #[test]
    fn test_from_map_complete() {
        let mut headers = HashMap::new();
        headers.insert(SIGNATURE_HEADER.to_string(), "sig".to_string());
        headers.insert(SIGNED_AT_HEADER.to_string(), "1700000000".to_string());
        headers.insert(
            SIGNED_BY_HEADER.to_string(),
            "instance example.com".to_string(),
        );

        let parsed = SignatureHeaders::from_map(&headers).unwrap();
        assert_eq!(parsed.signed_at, 1_700_000_000);
        assert_eq!(parsed.signed_by, "instance example.com");
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(calculate_digest(b"hello"), calculate_digest(b"hello"));
        assert_ne!(calculate_digest(b"hello"), calculate_digest(b"hellp"));
    }
}
