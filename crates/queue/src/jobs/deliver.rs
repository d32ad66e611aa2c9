//! Outbound entity delivery job.

use serde::{Deserialize, Serialize};

/// Job to deliver one signed entity to one remote inbox.
///
/// Fan-out to many inboxes is expanded into one job per inbox before
/// queueing, so each target retries on its own schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverJob {
    /// Local user the entity is signed as.
    pub sender_id: String,

    /// Target inbox URL.
    pub inbox: String,

    /// Entity JSON to deliver.
    pub entity: serde_json::Value,

    /// Completed attempts. Each retry is queued as a fresh job carrying the
    /// incremented count, which drives the backoff delay.
    #[serde(default)]
    pub attempts: u32,
}

impl DeliverJob {
    /// Create a new deliver job.
    #[must_use]
    pub const fn new(sender_id: String, inbox: String, entity: serde_json::Value) -> Self {
        Self {
            sender_id,
            inbox,
            entity,
            attempts: 0,
        }
    }

    /// Copy of this job queued for the next attempt.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempts: self.attempts + 1,
            ..self.clone()
        }
    }
}
