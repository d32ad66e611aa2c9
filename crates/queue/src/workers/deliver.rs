//! Deliver worker.
//!
//! Signs one entity as its local sender and posts it to one remote inbox.
//! The dispatcher classifies the response: 2xx and 410 complete the job,
//! other 4xx dead-letter it, 5xx and network failures requeue with backoff.

use apalis::prelude::*;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;
use versia_common::{AppError, AppResult};
use versia_db::repositories::{InstanceRepository, UserRepository};
use versia_federation::{ActorKind, OutboundDispatcher};

use crate::jobs::DeliverJob;
use crate::retry::RetryConfig;
use crate::workers::{Requeue, dead_letter, retry_later};

/// Context for the deliver workers.
#[derive(Clone)]
pub struct DeliverWorkerContext {
    dispatcher: OutboundDispatcher,
    user_repo: UserRepository,
    instance_repo: InstanceRepository,
    retry: RetryConfig,
    requeue: Option<Arc<dyn Requeue<DeliverJob>>>,
}

impl DeliverWorkerContext {
    /// Create a new deliver worker context.
    #[must_use]
    pub fn new(
        dispatcher: OutboundDispatcher,
        user_repo: UserRepository,
        instance_repo: InstanceRepository,
    ) -> Self {
        Self {
            dispatcher,
            user_repo,
            instance_repo,
            retry: RetryConfig::default(),
            requeue: None,
        }
    }

    /// Override the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the queue used to schedule delayed retry attempts.
    #[must_use]
    pub fn with_requeue(mut self, requeue: Arc<dyn Requeue<DeliverJob>>) -> Self {
        self.requeue = Some(requeue);
        self
    }
}

/// Worker function for delivering entities.
///
/// # Errors
/// Returns [`Error::Failed`] when the transient failure could not be
/// rescheduled and [`Error::Abort`] for permanent ones.
pub async fn deliver_worker(
    job: DeliverJob,
    ctx: Data<DeliverWorkerContext>,
) -> Result<(), Error> {
    let outcome = deliver_entity(&job, &ctx).await;
    settle(job, outcome, &ctx).await
}

/// Map a delivery outcome onto the task lifecycle.
///
/// Unreachable inboxes with attempts left complete this task and queue a
/// delayed copy, so the backoff delay is enforced by the queue itself.
/// Rejections and exhausted attempts dead-letter.
async fn settle(
    job: DeliverJob,
    outcome: AppResult<()>,
    ctx: &DeliverWorkerContext,
) -> Result<(), Error> {
    match outcome {
        Ok(()) => {
            info!(inbox = %job.inbox, "Entity delivered");
            Ok(())
        }
        Err(e) if e.is_retryable() && ctx.retry.should_retry(job.attempts) => {
            let delay = ctx.retry.delay_for_attempt(job.attempts);
            warn!(
                inbox = %job.inbox,
                error = %e,
                attempt = job.attempts,
                delay_secs = delay.as_secs(),
                "Delivery failed, retry scheduled"
            );

            match &ctx.requeue {
                Some(queue) => match queue.requeue_after(job.next_attempt(), delay).await {
                    Ok(()) => Ok(()),
                    // Scheduling itself failed; redeliver this task so the
                    // attempt is not lost.
                    Err(schedule_err) => Err(retry_later(schedule_err)),
                },
                None => Err(retry_later(e)),
            }
        }
        Err(e) => {
            error!(
                inbox = %job.inbox,
                attempts = job.attempts,
                error = %e,
                "Delivery dead-lettered"
            );
            Err(dead_letter(e))
        }
    }
}

async fn deliver_entity(job: &DeliverJob, ctx: &DeliverWorkerContext) -> AppResult<()> {
    let sender = ctx
        .user_repo
        .find_by_id(&job.sender_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sender {}", job.sender_id)))?;
    let sender = ActorKind::from_model(sender)?;

    ctx.dispatcher.deliver(&sender, &job.inbox, &job.entity).await?;

    mark_communicated(ctx, &job.inbox).await;
    Ok(())
}

/// Record the successful exchange on the target instance, best effort.
async fn mark_communicated(ctx: &DeliverWorkerContext, inbox: &str) {
    let Some(host) = Url::parse(inbox)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
    else {
        return;
    };

    let touched = async {
        match ctx.instance_repo.find_by_host(&host).await? {
            Some(instance) => ctx.instance_repo.touch_communicated(&instance.id).await,
            None => Ok(()),
        }
    }
    .await;

    if let Err(e) = touched {
        warn!(host = %host, error = %e, "Failed to record instance communication");
    }
}
