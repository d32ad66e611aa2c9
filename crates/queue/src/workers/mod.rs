//! Worker functions and their contexts.

mod deliver;
mod inbox;

pub use deliver::{DeliverWorkerContext, deliver_worker};
pub use inbox::{InboxWorkerContext, inbox_worker};

use apalis::prelude::{Error, Storage};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use versia_common::{AppError, AppResult};

/// Schedules a copy of a job to run again after a backoff delay.
///
/// Workers complete the failed task and queue the next attempt through this
/// seam, so the delay between attempts is the one the retry configuration
/// computed rather than whatever the backend would do with a failed task.
#[async_trait]
pub trait Requeue<J>: Send + Sync {
    /// Queue `job` to run no earlier than `delay` from now.
    async fn requeue_after(&self, job: J, delay: Duration) -> AppResult<()>;
}

#[async_trait]
impl<J> Requeue<J> for apalis_redis::RedisStorage<J>
where
    J: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static,
{
    async fn requeue_after(&self, job: J, delay: Duration) -> AppResult<()> {
        let run_at = Utc::now()
            .timestamp()
            .saturating_add(i64::try_from(delay.as_secs()).unwrap_or(i64::MAX));

        self.clone()
            .schedule(job, run_at)
            .await
            .map_err(|e| AppError::Queue(format!("Failed to schedule retry: {e}")))?;
        Ok(())
    }
}

/// Fail the task so the backend redelivers it.
pub(crate) fn retry_later(e: AppError) -> Error {
    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
    Error::Failed(Arc::new(boxed))
}

/// Fail the task permanently; no further attempts.
pub(crate) fn dead_letter(e: AppError) -> Error {
    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
    Error::Abort(Arc::new(boxed))
}
