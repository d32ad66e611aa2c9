//! Common utilities and shared types for versia-rs.
//!
//! This crate provides foundational components used across all versia-rs crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Cryptography**: Ed25519 key handling for Versia signatures
//! - **HTTP Signatures**: The Versia signature scheme for inter-server requests
//! - **ID Generation**: UUID v7 identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use versia_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {}", id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod http_signature;
pub mod id;

pub use config::Config;
pub use crypto::{
    Ed25519Keypair, encode_verifying_key, generate_keypair, parse_signing_key, parse_verifying_key,
};
pub use error::{AppError, AppResult};
pub use http_signature::{
    SIGNATURE_HEADER, SIGNED_AT_HEADER, SIGNED_BY_HEADER, SignatureHeaders, calculate_digest,
    sign_request, signing_string, verify_request,
};
pub use id::IdGenerator;
