//! Error types for versia-rs.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
///
/// The federation variants carry the retry semantics the inbox queue relies
/// on: authentication and schema failures never retry, network failures do.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Actor not found: {0}")]
    ActorNotFound(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Federation Authentication Errors ===
    #[error("Request carries no signature headers")]
    SignatureMissing,

    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("Signature timestamp outside allowed window ({skew_secs}s skew)")]
    ClockSkewExceeded {
        /// Observed skew between the claimed timestamp and local time.
        skew_secs: i64,
    },

    // === Federation Network Errors ===
    #[error("Could not reach remote for resolution: {0}")]
    ResolutionUnreachable(String),

    #[error("Could not reach remote inbox: {0}")]
    DeliveryUnreachable(String),

    #[error("Remote rejected delivery with status {status}")]
    DeliveryRejected {
        /// HTTP status returned by the remote inbox.
        status: u16,
    },

    #[error("Malformed federation entity: {0}")]
    MalformedEntity(String),

    /// An entity references another one that has not been processed yet.
    /// Out-of-order delivery; the referenced entity may still arrive.
    #[error("Referenced entity has not arrived yet: {0}")]
    MissingAntecedent(String),

    /// Programming error: the relationship pair invariant was broken.
    /// Must never be reachable through valid input.
    #[error("Relationship invariant violation: {0}")]
    RelationshipInvariantViolation(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Federation error: {0}")]
    Federation(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) | Self::ActorNotFound(_) | Self::InstanceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Unauthorized
            | Self::SignatureMissing
            | Self::SignatureInvalid(_)
            | Self::ClockSkewExceeded { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::MalformedEntity(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,

            // 5xx Server Errors
            Self::ResolutionUnreachable(_)
            | Self::DeliveryUnreachable(_)
            | Self::DeliveryRejected { .. }
            | Self::MissingAntecedent(_)
            | Self::RelationshipInvariantViolation(_)
            | Self::Database(_)
            | Self::Redis(_)
            | Self::Federation(_)
            | Self::Queue(_)
            | Self::Config(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::ActorNotFound(_) => "ACTOR_NOT_FOUND",
            Self::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::SignatureMissing => "SIGNATURE_MISSING",
            Self::SignatureInvalid(_) => "SIGNATURE_INVALID",
            Self::ClockSkewExceeded { .. } => "CLOCK_SKEW_EXCEEDED",
            Self::ResolutionUnreachable(_) => "RESOLUTION_UNREACHABLE",
            Self::DeliveryUnreachable(_) => "DELIVERY_UNREACHABLE",
            Self::DeliveryRejected { .. } => "DELIVERY_REJECTED",
            Self::MalformedEntity(_) => "MALFORMED_ENTITY",
            Self::MissingAntecedent(_) => "MISSING_ANTECEDENT",
            Self::RelationshipInvariantViolation(_) => "RELATIONSHIP_INVARIANT_VIOLATION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Federation(_) => "FEDERATION_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a queue job failing with this error should be retried.
    ///
    /// Authentication failures, missing identities, and malformed payloads
    /// will not self-correct; transient network and storage conditions will.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResolutionUnreachable(_)
                | Self::DeliveryUnreachable(_)
                | Self::MissingAntecedent(_)
                | Self::Database(_)
                | Self::Redis(_)
                | Self::Queue(_)
        )
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Log server errors
        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
