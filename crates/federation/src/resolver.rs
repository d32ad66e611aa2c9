//! Remote actor and instance resolution.
//!
//! Resolution is backed by the database: a row fresher than the configured
//! TTL is returned as-is, a stale row is returned immediately while a
//! background refetch runs (stale-while-revalidate), and a miss or forced
//! refresh performs the network fetch inline. Concurrent fetches for the
//! same key are collapsed into one outbound request.

use crate::client::FederationClient;
use crate::entity::{Entity, InstanceMetadataEntity, UserEntity};
use chrono::{Duration, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use sea_orm::ActiveValue::Set;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use url::Url;
use versia_common::{AppError, AppResult, IdGenerator, crypto};
use versia_db::{
    entities::{instance, user},
    repositories::{InstanceRepository, UserRepository},
};

/// The identity this instance signs its own fetches with.
pub struct InstanceSigner {
    signing_key: SigningKey,
    signed_by: String,
}

impl InstanceSigner {
    /// Create a signer for instance-level signatures on `host`.
    #[must_use]
    pub fn new(signing_key: SigningKey, host: &str) -> Self {
        Self {
            signing_key,
            signed_by: format!("instance {host}"),
        }
    }

    /// The signing key.
    #[must_use]
    pub const fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The `versia-signed-by` value, in the `"instance <host>"` form.
    #[must_use]
    pub fn signed_by(&self) -> &str {
        &self.signed_by
    }
}

/// Why a resolution failed.
///
/// Cloneable so every waiter collapsed onto one in-flight fetch can receive
/// the same outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveFailure {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("response signature invalid: {0}")]
    SignatureInvalid(String),
    #[error("malformed document: {0}")]
    Malformed(String),
}

impl ResolveFailure {
    fn from_app(err: AppError) -> Self {
        match err {
            AppError::NotFound(m) | AppError::ActorNotFound(m) | AppError::InstanceNotFound(m) => {
                Self::NotFound(m)
            }
            AppError::SignatureInvalid(m) => Self::SignatureInvalid(m),
            AppError::MalformedEntity(m) => Self::Malformed(m),
            other => Self::Unreachable(other.to_string()),
        }
    }

    fn into_actor_error(self, reference: &str) -> AppError {
        match self {
            Self::NotFound(_) => AppError::ActorNotFound(reference.to_string()),
            Self::Unreachable(m) => AppError::ResolutionUnreachable(m),
            Self::SignatureInvalid(m) => AppError::SignatureInvalid(m),
            Self::Malformed(m) => AppError::MalformedEntity(m),
        }
    }

    fn into_instance_error(self, host: &str) -> AppError {
        match self {
            Self::NotFound(_) => AppError::InstanceNotFound(host.to_string()),
            Self::Unreachable(m) => AppError::ResolutionUnreachable(m),
            Self::SignatureInvalid(m) => AppError::SignatureInvalid(m),
            Self::Malformed(m) => AppError::MalformedEntity(m),
        }
    }
}

/// Collapses concurrent fetches for one key into a single in-flight future.
///
/// Every caller for an in-flight key awaits the same cell and receives a
/// clone of its result. The entry is removed once settled, so a later call
/// starts a fresh fetch.
pub struct SingleFlight<T: Clone> {
    flights: Mutex<HashMap<String, Arc<OnceCell<Result<T, ResolveFailure>>>>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    /// Run `fetch` for `key`, or await the fetch already in flight for it.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> Result<T, ResolveFailure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveFailure>>,
    {
        let cell = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell.get_or_init(fetch).await.clone();

        self.flights.lock().await.remove(key);

        result
    }
}

/// A parsed actor reference: `user@host` or a canonical URI.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ActorRef {
    Acct { username: String, host: String },
    Uri(String),
}

fn parse_actor_ref(reference: &str) -> AppResult<ActorRef> {
    if reference.contains("://") {
        return Ok(ActorRef::Uri(reference.to_string()));
    }

    let stripped = reference.strip_prefix('@').unwrap_or(reference);
    let mut parts = stripped.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(username), Some(host)) if !username.is_empty() && !host.is_empty() => {
            Ok(ActorRef::Acct {
                username: username.to_string(),
                host: host.to_string(),
            })
        }
        _ => Err(AppError::BadRequest(format!(
            "Invalid actor reference: {reference}"
        ))),
    }
}

/// Resolver for remote actors and instances.
#[derive(Clone)]
pub struct EntityResolver {
    client: FederationClient,
    user_repo: UserRepository,
    instance_repo: InstanceRepository,
    signer: Arc<InstanceSigner>,
    actor_ttl: Duration,
    instance_ttl: Duration,
    actor_flights: Arc<SingleFlight<user::Model>>,
    instance_flights: Arc<SingleFlight<instance::Model>>,
    id_gen: IdGenerator,
}

impl EntityResolver {
    /// Create a new resolver.
    #[must_use]
    pub fn new(
        client: FederationClient,
        user_repo: UserRepository,
        instance_repo: InstanceRepository,
        signer: Arc<InstanceSigner>,
        actor_ttl_secs: i64,
        instance_ttl_secs: i64,
    ) -> Self {
        Self {
            client,
            user_repo,
            instance_repo,
            signer,
            actor_ttl: Duration::seconds(actor_ttl_secs),
            instance_ttl: Duration::seconds(instance_ttl_secs),
            actor_flights: Arc::new(SingleFlight::default()),
            instance_flights: Arc::new(SingleFlight::default()),
            id_gen: IdGenerator::new(),
        }
    }

    /// Resolve an actor by `user@host` or canonical URI.
    ///
    /// `force` bypasses the cache and always fetches.
    pub async fn resolve_actor(&self, reference: &str, force: bool) -> AppResult<user::Model> {
        let actor_ref = parse_actor_ref(reference)?;

        let cached = match &actor_ref {
            ActorRef::Acct { username, host } => {
                self.user_repo
                    .find_by_username_host(username, Some(host))
                    .await?
            }
            ActorRef::Uri(uri) => self.user_repo.find_by_uri(uri).await?,
        };

        if let Some(cached) = cached {
            // Local actors are authoritative here, never fetched.
            if cached.is_local() {
                return Ok(cached);
            }
            if !force {
                if self.is_fresh(cached.last_fetched_at, self.actor_ttl) {
                    return Ok(cached);
                }
                debug!(reference = reference, "Returning stale actor, refreshing in background");
                self.spawn_actor_refresh(reference.to_string());
                return Ok(cached);
            }
        }

        let resolver = self.clone();
        let fetch_ref = actor_ref.clone();
        self.actor_flights
            .run(reference, || async move { resolver.fetch_actor(fetch_ref).await })
            .await
            .map_err(|e| e.into_actor_error(reference))
    }

    /// Resolve an instance by host.
    pub async fn resolve_instance(&self, host: &str, force: bool) -> AppResult<instance::Model> {
        if let Some(cached) = self.instance_repo.find_by_host(host).await?
            && !force
        {
            if self.is_fresh(cached.last_fetched_at, self.instance_ttl) {
                return Ok(cached);
            }
            debug!(host = host, "Returning stale instance, refreshing in background");
            self.spawn_instance_refresh(host.to_string());
            return Ok(cached);
        }

        let resolver = self.clone();
        let fetch_host = host.to_string();
        self.instance_flights
            .run(host, || async move { resolver.fetch_instance(&fetch_host).await })
            .await
            .map_err(|e| e.into_instance_error(host))
    }

    /// Resolve a `versia-signed-by` value to the key that should verify the
    /// signature: an actor URI, or the `"instance <host>"` form.
    pub async fn resolve_signer_key(&self, signed_by: &str) -> AppResult<VerifyingKey> {
        if let Some(host) = signed_by.strip_prefix("instance ") {
            let inst = self.resolve_instance(host.trim(), false).await?;
            let key = inst.public_key.ok_or_else(|| {
                AppError::SignatureInvalid(format!("Instance {host} advertises no public key"))
            })?;
            return crypto::parse_verifying_key(&key)
                .map_err(|e| AppError::SignatureInvalid(e.to_string()));
        }

        let actor = self.resolve_actor(signed_by, false).await?;
        crypto::parse_verifying_key(&actor.public_key)
            .map_err(|e| AppError::SignatureInvalid(e.to_string()))
    }

    /// Upsert a user row from an actor document.
    ///
    /// Shared by the fetch path and the inbound `User` update handler.
    pub async fn apply_user_entity(&self, doc: UserEntity) -> AppResult<user::Model> {
        let parsed = Url::parse(&doc.uri)
            .map_err(|e| AppError::MalformedEntity(format!("Actor URI {}: {e}", doc.uri)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AppError::MalformedEntity(format!("Actor URI {} has no host", doc.uri)))?
            .to_string();

        self.ensure_instance_record(&host).await?;

        let existing = self.user_repo.find_by_uri(&doc.uri).await?;
        let now = Utc::now();

        match existing {
            Some(row) => {
                let mut active: user::ActiveModel = row.into();
                active.username = Set(doc.username.clone());
                active.username_lower = Set(doc.username.to_lowercase());
                active.name = Set(doc.display_name);
                active.description = Set(doc.bio);
                active.avatar_url = Set(doc.avatar);
                active.banner_url = Set(doc.header);
                active.public_key = Set(doc.public_key.key);
                active.inbox = Set(Some(doc.inbox));
                active.shared_inbox = Set(doc.shared_inbox);
                active.is_locked = Set(doc.manually_approves_followers);
                active.last_fetched_at = Set(Some(now.into()));
                active.updated_at = Set(Some(now.into()));
                self.user_repo.update(active).await
            }
            None => {
                let active = user::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    username: Set(doc.username.clone()),
                    username_lower: Set(doc.username.to_lowercase()),
                    host: Set(Some(host)),
                    uri: Set(Some(doc.uri)),
                    inbox: Set(Some(doc.inbox)),
                    shared_inbox: Set(doc.shared_inbox),
                    public_key: Set(doc.public_key.key),
                    private_key: Set(None),
                    name: Set(doc.display_name),
                    description: Set(doc.bio),
                    avatar_url: Set(doc.avatar),
                    banner_url: Set(doc.header),
                    is_locked: Set(doc.manually_approves_followers),
                    is_suspended: Set(false),
                    followers_count: Set(0),
                    following_count: Set(0),
                    last_fetched_at: Set(Some(now.into())),
                    created_at: Set(now.into()),
                    updated_at: Set(None),
                };
                self.user_repo.create(active).await
            }
        }
    }

    /// Upsert an instance row from a metadata document.
    pub async fn apply_instance_metadata(
        &self,
        host: &str,
        doc: InstanceMetadataEntity,
    ) -> AppResult<instance::Model> {
        let existing = self.instance_repo.find_by_host(host).await?;
        let now = Utc::now();

        match existing {
            Some(row) => {
                let mut active: instance::ActiveModel = row.into();
                active.name = Set(Some(doc.name));
                active.description = Set(doc.description);
                active.software_name = Set(Some(doc.software.name));
                active.software_version = Set(Some(doc.software.version));
                active.public_key = Set(Some(doc.public_key.key));
                active.last_fetched_at = Set(Some(now.into()));
                active.updated_at = Set(Some(now.into()));
                self.instance_repo.update(active).await
            }
            None => {
                let active = instance::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    host: Set(host.to_string()),
                    public_key: Set(Some(doc.public_key.key)),
                    shared_inbox: Set(None),
                    software_name: Set(Some(doc.software.name)),
                    software_version: Set(Some(doc.software.version)),
                    name: Set(Some(doc.name)),
                    description: Set(doc.description),
                    is_blocked: Set(false),
                    last_fetched_at: Set(Some(now.into())),
                    last_communicated_at: Set(None),
                    created_at: Set(now.into()),
                    updated_at: Set(None),
                };
                self.instance_repo.create(active).await
            }
        }
    }

    // === fetch paths ===

    async fn fetch_actor(&self, actor_ref: ActorRef) -> Result<user::Model, ResolveFailure> {
        let uri = match actor_ref {
            ActorRef::Acct { username, host } => self
                .client
                .webfinger(&username, &host)
                .await
                .map_err(ResolveFailure::from_app)?,
            ActorRef::Uri(uri) => Url::parse(&uri)
                .map_err(|e| ResolveFailure::Malformed(format!("Actor URI {uri}: {e}")))?,
        };

        let doc = self
            .client
            .signed_fetch(&uri, self.signer.signing_key(), self.signer.signed_by())
            .await
            .map_err(ResolveFailure::from_app)?;

        let entity: Entity = serde_json::from_value(doc.value.clone())
            .map_err(|e| ResolveFailure::Malformed(format!("{uri}: {e}")))?;
        let Entity::User(user_doc) = entity else {
            return Err(ResolveFailure::Malformed(format!(
                "{uri} is not an actor document"
            )));
        };

        // The document must be signed by the key it claims.
        let claimed_key = crypto::parse_verifying_key(&user_doc.public_key.key)
            .map_err(|e| ResolveFailure::Malformed(e.to_string()))?;
        if !doc.verify(&claimed_key) {
            return Err(ResolveFailure::SignatureInvalid(format!(
                "Actor document at {uri} failed verification against its own key"
            )));
        }

        let model = self
            .apply_user_entity(user_doc)
            .await
            .map_err(ResolveFailure::from_app)?;

        info!(uri = %uri, user_id = %model.id, "Resolved remote actor");
        Ok(model)
    }

    async fn fetch_instance(&self, host: &str) -> Result<instance::Model, ResolveFailure> {
        let url = Url::parse(&format!("https://{host}/.well-known/versia"))
            .map_err(|e| ResolveFailure::Malformed(format!("Instance host {host}: {e}")))?;

        let doc = self
            .client
            .signed_fetch(&url, self.signer.signing_key(), self.signer.signed_by())
            .await
            .map_err(ResolveFailure::from_app)?;

        let entity: Entity = serde_json::from_value(doc.value.clone())
            .map_err(|e| ResolveFailure::Malformed(format!("{url}: {e}")))?;
        let Entity::InstanceMetadata(metadata) = entity else {
            return Err(ResolveFailure::Malformed(format!(
                "{url} is not an instance metadata document"
            )));
        };

        // Verify against the self-reported key when one is present.
        if !metadata.public_key.key.is_empty() {
            let claimed_key = crypto::parse_verifying_key(&metadata.public_key.key)
                .map_err(|e| ResolveFailure::Malformed(e.to_string()))?;
            if doc.signature.is_some() && !doc.verify(&claimed_key) {
                return Err(ResolveFailure::SignatureInvalid(format!(
                    "Instance metadata at {url} failed verification against its own key"
                )));
            }
        }

        let model = self
            .apply_instance_metadata(host, metadata)
            .await
            .map_err(ResolveFailure::from_app)?;

        info!(host = host, "Resolved instance metadata");
        Ok(model)
    }

    /// Create a bare instance row on first contact with a host.
    async fn ensure_instance_record(&self, host: &str) -> AppResult<()> {
        if self.instance_repo.find_by_host(host).await?.is_some() {
            return Ok(());
        }

        let active = instance::ActiveModel {
            id: Set(self.id_gen.generate()),
            host: Set(host.to_string()),
            public_key: Set(None),
            shared_inbox: Set(None),
            software_name: Set(None),
            software_version: Set(None),
            name: Set(None),
            description: Set(None),
            is_blocked: Set(false),
            last_fetched_at: Set(None),
            last_communicated_at: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };
        self.instance_repo.create(active).await?;
        Ok(())
    }

    fn is_fresh(
        &self,
        last_fetched_at: Option<chrono::DateTime<chrono::FixedOffset>>,
        ttl: Duration,
    ) -> bool {
        last_fetched_at.is_some_and(|t| Utc::now().signed_duration_since(t.to_utc()) < ttl)
    }

    fn spawn_actor_refresh(&self, reference: String) {
        let resolver = self.clone();
        tokio::spawn(async move {
            if let Err(e) = resolver.resolve_actor(&reference, true).await {
                warn!(reference = reference, error = %e, "Background actor refresh failed");
            }
        });
    }

    fn spawn_instance_refresh(&self, host: String) {
        let resolver = self.clone();
        tokio::spawn(async move {
            if let Err(e) = resolver.resolve_instance(&host, true).await {
                warn!(host = host, error = %e, "Background instance refresh failed");
            }
        });
    }
}
