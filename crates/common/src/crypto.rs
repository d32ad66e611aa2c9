//! Cryptographic utilities for Versia signatures.
//!
//! This module provides Ed25519 key generation and parsing used for the
//! detached HTTP message signatures on inter-server requests. Keys travel
//! as base64-encoded raw 32-byte values.
//!
//! # Examples
//!
//! ```
//! use versia_common::crypto::{generate_keypair, parse_signing_key, parse_verifying_key};
//!
//! // Generate a new key pair
//! let keypair = generate_keypair();
//!
//! // Parse the keys back
//! let _signing = parse_signing_key(&keypair.private_key).expect("Failed to parse");
//! let _verifying = parse_verifying_key(&keypair.public_key).expect("Failed to parse");
//! ```

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{SECRET_KEY_LENGTH, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::{AppError, AppResult};

/// Ed25519 key pair for Versia HTTP signatures.
///
/// Both keys are base64-encoded raw bytes, matching the encoding used in
/// actor and instance metadata documents.
#[derive(Debug, Clone)]
pub struct Ed25519Keypair {
    /// Public key, base64-encoded 32 bytes.
    pub public_key: String,
    /// Private key, base64-encoded 32 bytes.
    pub private_key: String,
}

/// Generate a new Ed25519 key pair.
#[must_use]
pub fn generate_keypair() -> Ed25519Keypair {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    Ed25519Keypair {
        public_key: BASE64.encode(verifying_key.as_bytes()),
        private_key: BASE64.encode(signing_key.to_bytes()),
    }
}

/// Parse an Ed25519 signing (private) key from base64.
///
/// # Errors
///
/// Returns [`AppError::Internal`] if the input is not valid base64 or does
/// not decode to exactly 32 bytes.
pub fn parse_signing_key(encoded: &str) -> AppResult<SigningKey> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| AppError::Internal(format!("Failed to decode private key: {e}")))?;

    let bytes: [u8; SECRET_KEY_LENGTH] = bytes
        .try_into()
        .map_err(|_| AppError::Internal("Private key is not 32 bytes".to_string()))?;

    Ok(SigningKey::from_bytes(&bytes))
}

/// Parse an Ed25519 verifying (public) key from base64.
///
/// # Errors
///
/// Returns [`AppError::Internal`] if the input is not valid base64, does not
/// decode to 32 bytes, or is not a valid curve point.
pub fn parse_verifying_key(encoded: &str) -> AppResult<VerifyingKey> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| AppError::Internal(format!("Failed to decode public key: {e}")))?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AppError::Internal("Public key is not 32 bytes".to_string()))?;

    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| AppError::Internal(format!("Invalid public key: {e}")))
}

/// Encode a verifying key back to its base64 wire form.
#[must_use]
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    BASE64.encode(key.as_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keypair() {
        let keypair = generate_keypair();

        // Raw 32-byte keys are 44 base64 characters
        assert_eq!(keypair.public_key.len(), 44);
        assert_eq!(keypair.private_key.len(), 44);
    }

    #[test]
    fn test_parse_generated_keys() {
        let keypair = generate_keypair();

        let signing = parse_signing_key(&keypair.private_key).unwrap();
        let verifying = parse_verifying_key(&keypair.public_key).unwrap();

        // The parsed private key must correspond to the parsed public key
        assert_eq!(signing.verifying_key(), verifying);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_signing_key("not base64!!!").is_err());
        assert!(parse_verifying_key("dG9vIHNob3J0").is_err());
    }

    #[test]
    fn test_encode_round_trip() {
        let keypair = generate_keypair();
        let verifying = parse_verifying_key(&keypair.public_key).unwrap();

        assert_eq!(encode_verifying_key(&verifying), keypair.public_key);
    }
}
