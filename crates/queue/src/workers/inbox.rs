//! Inbox worker.
//!
//! Runs the full authentication and dispatch pipeline for one captured
//! inbound request: signature presence, signer key resolution, verification
//! and clock skew, entity parsing, then the per-type processor. The endpoint
//! already acknowledged with 200, so every failure is classified here:
//! transient ones requeue with backoff, permanent ones dead-letter.

use std::sync::Arc;

use apalis::prelude::*;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use tracing::{debug, error, info, warn};
use url::Url;
use versia_common::{AppError, AppResult, http_signature::verify_request};
use versia_core::{DeliveryService, NotificationService, RelationshipService};
use versia_db::repositories::{
    InstanceRepository, NotificationRepository, RelationshipRepository, UserRepository,
};
use versia_federation::{Entity, EntityResolver, ProcessorContext, process_entity};

use crate::jobs::InboxJob;
use crate::retry::RetryConfig;
use crate::workers::{Requeue, dead_letter, retry_later};

/// Context for the inbox workers.
#[derive(Clone)]
pub struct InboxWorkerContext {
    db: Arc<DatabaseConnection>,
    resolver: EntityResolver,
    base_url: Url,
    delivery: Option<DeliveryService>,
    clock_skew_secs: i64,
    retry: RetryConfig,
    requeue: Option<Arc<dyn Requeue<InboxJob>>>,
}

impl InboxWorkerContext {
    /// Create a new inbox worker context.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        resolver: EntityResolver,
        base_url: Url,
        clock_skew_secs: i64,
    ) -> Self {
        Self {
            db,
            resolver,
            base_url,
            delivery: None,
            clock_skew_secs,
            retry: RetryConfig::default(),
            requeue: None,
        }
    }

    /// Set the delivery service used to queue Accepts and retractions.
    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryService) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Override the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the queue used to schedule delayed retry attempts.
    #[must_use]
    pub fn with_requeue(mut self, requeue: Arc<dyn Requeue<InboxJob>>) -> Self {
        self.requeue = Some(requeue);
        self
    }

    fn user_repo(&self) -> UserRepository {
        UserRepository::new(Arc::clone(&self.db))
    }

    fn instance_repo(&self) -> InstanceRepository {
        InstanceRepository::new(Arc::clone(&self.db))
    }

    fn notification_repo(&self) -> NotificationRepository {
        NotificationRepository::new(Arc::clone(&self.db))
    }

    fn relationship_service(&self) -> RelationshipService {
        let mut service = RelationshipService::new(
            RelationshipRepository::new(Arc::clone(&self.db)),
            self.user_repo(),
            NotificationService::new(self.notification_repo()),
        );
        if let Some(delivery) = &self.delivery {
            service.set_delivery(delivery.clone());
        }
        service
    }

    fn processor_context(&self) -> ProcessorContext {
        ProcessorContext {
            relationships: self.relationship_service(),
            resolver: self.resolver.clone(),
            users: self.user_repo(),
            notifications: self.notification_repo(),
            base_url: self.base_url.clone(),
        }
    }
}

/// Worker function for processing captured inbound requests.
///
/// # Errors
/// Returns [`Error::Failed`] when the transient failure could not be
/// rescheduled and [`Error::Abort`] for permanent ones.
pub async fn inbox_worker(job: InboxJob, ctx: Data<InboxWorkerContext>) -> Result<(), Error> {
    let outcome = handle_inbox(&job, &ctx).await;
    settle(job, outcome, &ctx).await
}

/// Map a processing outcome onto the task lifecycle.
///
/// Transient failures with attempts left complete this task and queue a
/// delayed copy, so the backoff delay is enforced by the queue itself.
/// Everything else dead-letters.
async fn settle(
    job: InboxJob,
    outcome: AppResult<()>,
    ctx: &InboxWorkerContext,
) -> Result<(), Error> {
    match outcome {
        Ok(()) => {
            info!("Inbound entity processed");
            Ok(())
        }
        Err(e) if e.is_retryable() && ctx.retry.should_retry(job.attempts) => {
            let delay = ctx.retry.delay_for_attempt(job.attempts);
            warn!(
                error = %e,
                attempt = job.attempts,
                delay_secs = delay.as_secs(),
                "Inbox job failed, retry scheduled"
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
                attempts = job.attempts,
                error = %e,
                "Inbox job dead-lettered"
            );
            Err(dead_letter(e))
        }
    }
}

async fn handle_inbox(job: &InboxJob, ctx: &InboxWorkerContext) -> AppResult<()> {
    authenticate(job, ctx).await?;

    let entity: Entity = serde_json::from_slice(&job.body)
        .map_err(|e| AppError::MalformedEntity(e.to_string()))?;

    process_entity(&ctx.processor_context(), entity).await
}

/// Authenticate a captured request before dispatch.
///
/// A request without the three signature headers is rejected unless it
/// carries a legacy `authorization` header, which is accepted for older
/// software that cannot sign yet. Verification binds the signature to the
/// request exactly as the endpoint received it.
async fn authenticate(job: &InboxJob, ctx: &InboxWorkerContext) -> AppResult<()> {
    let Some(headers) = job.signature_headers() else {
        if job.authorization.is_some() {
            debug!("Unsigned request accepted on the legacy authorization path");
            return Ok(());
        }
        return Err(AppError::SignatureMissing);
    };

    let host = signer_host(&headers.signed_by)?;
    if ctx.instance_repo().is_blocked(&host).await? {
        return Err(AppError::Forbidden(format!("Instance {host} is blocked")));
    }

    let key = ctx.resolver.resolve_signer_key(&headers.signed_by).await?;

    if !verify_request(&key, &headers, &job.method, &job.path, &job.body) {
        return Err(AppError::SignatureInvalid(format!(
            "Signature by {} does not match the request",
            headers.signed_by
        )));
    }

    // Skew is judged against arrival time, so queue latency never expires
    // a request that was fresh when it came in.
    let skew = (job.received_at.timestamp() - headers.signed_at).abs();
    if skew > ctx.clock_skew_secs {
        return Err(AppError::ClockSkewExceeded { skew_secs: skew });
    }

    Ok(())
}

/// The host a `versia-signed-by` value belongs to.
fn signer_host(signed_by: &str) -> AppResult<String> {
    if let Some(host) = signed_by.strip_prefix("instance ") {
        return Ok(host.trim().to_string());
    }

    Url::parse(signed_by)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .ok_or_else(|| {
            AppError::SignatureInvalid(format!("Unresolvable signer identity: {signed_by}"))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::time::Duration as StdDuration;
    use versia_common::crypto::{generate_keypair, parse_signing_key};
    use versia_common::http_signature::sign_request;
    use versia_db::entities::{instance, user};
    use versia_federation::{FederationClient, InstanceSigner};

    fn test_context(db: Arc<DatabaseConnection>) -> InboxWorkerContext {
        let keypair = generate_keypair();
        let signer = InstanceSigner::new(
            parse_signing_key(&keypair.private_key).unwrap(),
            "local.example",
        );
        let base = Url::parse("https://local.example/").unwrap();
        let resolver = EntityResolver::new(
            FederationClient::new(&base, StdDuration::from_secs(5)).unwrap(),
            UserRepository::new(db.clone()),
            InstanceRepository::new(db.clone()),
            Arc::new(signer),
            86_400,
            86_400,
        );
        InboxWorkerContext::new(db, resolver, base, 300)
    }

    fn remote_sender(public_key: &str) -> user::Model {
        user::Model {
            id: "u-bob".to_string(),
            username: "bob".to_string(),
            username_lower: "bob".to_string(),
            host: Some("remote.example".to_string()),
            uri: Some("https://remote.example/users/bob".to_string()),
            inbox: Some("https://remote.example/users/bob/inbox".to_string()),
            shared_inbox: None,
            public_key: public_key.to_string(),
            private_key: None,
            name: None,
            description: None,
            avatar_url: None,
            banner_url: None,
            is_locked: false,
            is_suspended: false,
            followers_count: 0,
            following_count: 0,
            last_fetched_at: Some(Utc::now().into()),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn signed_job(private_key: &str, signed_at_offset_secs: i64, body: &[u8]) -> InboxJob {
        let signing = parse_signing_key(private_key).unwrap();
        let now = Utc::now();
        let headers = sign_request(
            &signing,
            "https://remote.example/users/bob",
            "POST",
            "/inbox",
            body,
            now + chrono::Duration::seconds(signed_at_offset_secs),
        );

        InboxJob {
            body: body.to_vec(),
            signature: Some(headers.signature),
            signed_at: Some(headers.signed_at),
            signed_by: Some(headers.signed_by),
            authorization: None,
            method: "POST".to_string(),
            path: "/inbox".to_string(),
            received_at: now,
            attempts: 0,
        }
    }

    fn legacy_job(body: &[u8]) -> InboxJob {
        InboxJob {
            body: body.to_vec(),
            signature: None,
            signed_at: None,
            signed_by: None,
            authorization: Some("Bearer legacy-token".to_string()),
            method: "POST".to_string(),
            path: "/inbox".to_string(),
            received_at: Utc::now(),
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_unsigned_without_authorization_is_final() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let ctx = test_context(db);

        let job = InboxJob {
            body: b"{}".to_vec(),
            signature: None,
            signed_at: None,
            signed_by: None,
            authorization: None,
            method: "POST".to_string(),
            path: "/inbox".to_string(),
            received_at: Utc::now(),
            attempts: 0,
        };

        let err = handle_inbox(&job, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::SignatureMissing));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_legacy_authorization_skips_verification() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let ctx = test_context(db);

        // Unknown entity types are acknowledged, so no further DB access
        let job = legacy_job(br#"{"type":"Poll","uri":"https://remote.example/polls/1"}"#);

        handle_inbox(&job, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_timestamp_is_rejected_permanently() {
        let keypair = generate_keypair();
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                // Instance block check finds nothing
                .append_query_results([Vec::<instance::Model>::new()])
                // Signer resolution hits the fresh cached actor
                .append_query_results([vec![remote_sender(&keypair.public_key)]])
                .into_connection(),
        );
        let ctx = test_context(db);

        let job = signed_job(&keypair.private_key, -10_000, b"{}");

        let err = handle_inbox(&job, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::ClockSkewExceeded { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_tampered_body_fails_verification() {
        let keypair = generate_keypair();
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<instance::Model>::new()])
                .append_query_results([vec![remote_sender(&keypair.public_key)]])
                .into_connection(),
        );
        let ctx = test_context(db);

        let mut job = signed_job(&keypair.private_key, 0, br#"{"type":"Follow"}"#);
        job.body = br#"{"type":"Delete"}"#.to_vec();

        let err = handle_inbox(&job, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::SignatureInvalid(_)));
        assert!(!err.is_retryable());
    }

    #[derive(Default)]
    struct CapturingRequeue {
        scheduled: std::sync::Mutex<Vec<(u32, StdDuration)>>,
    }

    #[async_trait::async_trait]
    impl Requeue<InboxJob> for CapturingRequeue {
        async fn requeue_after(&self, job: InboxJob, delay: StdDuration) -> AppResult<()> {
            self.scheduled.lock().unwrap().push((job.attempts, delay));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transient_failure_schedules_delayed_copy() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let requeue = Arc::new(CapturingRequeue::default());
        let ctx = test_context(db).with_requeue(requeue.clone());

        let mut job = legacy_job(b"{}");
        job.attempts = 2;

        let outcome = Err(AppError::ResolutionUnreachable("remote.example".to_string()));
        settle(job, outcome, &ctx).await.unwrap();

        // Third attempt, delayed 60s * 2^2
        let scheduled = requeue.scheduled.lock().unwrap();
        assert_eq!(scheduled.as_slice(), &[(3, StdDuration::from_secs(240))]);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_dead_letter() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let requeue = Arc::new(CapturingRequeue::default());
        let ctx = test_context(db).with_requeue(requeue.clone());

        let mut job = legacy_job(b"{}");
        job.attempts = RetryConfig::default().max_retries;

        let outcome = Err(AppError::ResolutionUnreachable("remote.example".to_string()));
        let err = settle(job, outcome, &ctx).await.unwrap_err();

        assert!(matches!(err, Error::Abort(_)));
        assert!(requeue.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_never_rescheduled() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let requeue = Arc::new(CapturingRequeue::default());
        let ctx = test_context(db).with_requeue(requeue.clone());

        let err = settle(legacy_job(b"{}"), Err(AppError::SignatureMissing), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Abort(_)));
        assert!(requeue.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_without_requeue_transient_failure_fails_the_task() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let ctx = test_context(db);

        let outcome = Err(AppError::ResolutionUnreachable("remote.example".to_string()));
        let err = settle(legacy_job(b"{}"), outcome, &ctx).await.unwrap_err();

        assert!(matches!(err, Error::Failed(_)));
    }

    #[test]
    fn test_signer_host_forms() {
        assert_eq!(
            signer_host("instance remote.example").unwrap(),
            "remote.example"
        );
        assert_eq!(
            signer_host("https://remote.example/users/bob").unwrap(),
            "remote.example"
        );
        assert!(signer_host("not a signer").is_err());
    }
}
