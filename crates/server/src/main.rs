//! Versia-rs server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::*;
use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use versia_common::{
    Config,
    crypto::{generate_keypair, parse_signing_key},
};
use versia_core::{DeliveryService, NotificationService, RelationshipService};
use versia_db::repositories::{
    InstanceRepository, NotificationRepository, RelationshipRepository, UserRepository,
};
use versia_federation::{
    ActorState, EntityBuilder, EntityResolver, FederationClient, InboxQueue, InboxState,
    InstanceMetadataState, InstanceSigner, OutboundDispatcher, WebfingerState, actor_handler,
    inbox_handler, instance_metadata_handler, webfinger_handler,
};
use versia_queue::{
    DeliverJob, DeliverWorkerContext, InboxJob, InboxWorkerContext, MaintenanceExecutor,
    RedisDeliveryService, RetryConfig, SchedulerConfig, deliver_worker, inbox_worker,
    run_scheduler,
};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "versia=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting versia-rs server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database and run migrations
    let db = Arc::new(versia_db::init(&config).await?);
    info!("Connected to database");
    versia_db::migrate(&db).await?;
    info!("Migrations completed");

    // Connect to Redis and set up the two job queues
    info!("Connecting to Redis...");
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let deliver_storage = apalis_redis::RedisStorage::<DeliverJob>::new_with_config(
        redis_conn.clone(),
        apalis_redis::Config::default()
            .set_namespace(&format!("{}::deliver", config.redis.prefix)),
    );
    let inbox_storage = apalis_redis::RedisStorage::<InboxJob>::new_with_config(
        redis_conn,
        apalis_redis::Config::default().set_namespace(&format!("{}::inbox", config.redis.prefix)),
    );
    info!("Connected to Redis job queues");

    // Instance signing identity
    let base_url = Url::parse(&config.server.url)?;
    let domain = base_url.host_str().unwrap_or("localhost").to_string();
    let instance_key = match &config.federation.instance_private_key {
        Some(encoded) => parse_signing_key(encoded)?,
        None => {
            let keypair = generate_keypair();
            warn!(
                public_key = %keypair.public_key,
                "No federation.instance_private_key configured; \
                 generated an ephemeral key, signed fetches will not survive a restart"
            );
            parse_signing_key(&keypair.private_key)?
        }
    };
    let signer = Arc::new(InstanceSigner::new(instance_key, &domain));

    // Repositories
    let user_repo = UserRepository::new(Arc::clone(&db));
    let instance_repo = InstanceRepository::new(Arc::clone(&db));
    let relationship_repo = RelationshipRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));

    // Federation plumbing
    let client = FederationClient::new(
        &base_url,
        Duration::from_secs(config.federation.request_timeout_secs),
    )?;
    let builder = EntityBuilder::new(base_url.clone());
    let resolver = EntityResolver::new(
        client.clone(),
        user_repo.clone(),
        instance_repo.clone(),
        signer.clone(),
        config.federation.actor_ttl_secs,
        config.federation.instance_ttl_secs,
    );

    // Queueing service: entity delivery for core, durable inbox for the endpoint
    let queueing = Arc::new(RedisDeliveryService::new(
        deliver_storage.clone(),
        inbox_storage.clone(),
        builder.clone(),
    ));
    let delivery_service: DeliveryService = queueing.clone();
    let inbox_queue: Arc<dyn InboxQueue> = queueing;

    let relationship_service = RelationshipService::with_delivery(
        relationship_repo.clone(),
        user_repo.clone(),
        NotificationService::new(notification_repo),
        delivery_service.clone(),
    );

    // Router
    let webfinger_state = WebfingerState {
        domain,
        base_url: base_url.clone(),
        user_repo: user_repo.clone(),
    };
    let actor_state = ActorState {
        user_repo: user_repo.clone(),
        builder: builder.clone(),
    };
    let metadata_state = InstanceMetadataState {
        name: config.federation.instance_name.clone(),
        description: config.federation.instance_description.clone(),
        builder: builder.clone(),
        signer,
    };
    let inbox_state = InboxState { queue: inbox_queue };

    let app = Router::new()
        .route(
            "/.well-known/webfinger",
            get(webfinger_handler).with_state(webfinger_state),
        )
        .route(
            "/.well-known/versia",
            get(instance_metadata_handler).with_state(metadata_state),
        )
        .route("/users/{id}", get(actor_handler).with_state(actor_state))
        .route("/inbox", post(inbox_handler).with_state(inbox_state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Workers and scheduler
    if config.federation.enabled {
        info!("Starting federation workers...");

        let retry = RetryConfig {
            max_retries: config.federation.max_retries,
            ..RetryConfig::default()
        };

        let inbox_ctx = InboxWorkerContext::new(
            Arc::clone(&db),
            resolver.clone(),
            base_url.clone(),
            config.federation.clock_skew_secs,
        )
        .with_delivery(delivery_service.clone())
        .with_retry(retry.clone())
        .with_requeue(Arc::new(inbox_storage.clone()));

        let dispatcher = OutboundDispatcher::new(
            client,
            builder,
            user_repo.clone(),
            relationship_repo,
        );
        let deliver_ctx =
            DeliverWorkerContext::new(dispatcher, user_repo, instance_repo.clone())
                .with_retry(retry)
                .with_requeue(Arc::new(deliver_storage.clone()));

        let inbox_workers = config.federation.inbox_workers;
        let deliver_workers = config.federation.deliver_workers;
        tokio::spawn(async move {
            let monitor = Monitor::new()
                .register(
                    WorkerBuilder::new("inbox")
                        .concurrency(inbox_workers)
                        .data(inbox_ctx)
                        .backend(inbox_storage)
                        .build_fn(inbox_worker),
                )
                .register(
                    WorkerBuilder::new("deliver")
                        .concurrency(deliver_workers)
                        .data(deliver_ctx)
                        .backend(deliver_storage)
                        .build_fn(deliver_worker),
                );

            if let Err(e) = monitor.run().await {
                error!(error = %e, "Federation workers failed");
            }
        });

        let scheduler_config = SchedulerConfig {
            instance_stale_after: chrono::Duration::seconds(config.federation.instance_ttl_secs),
            ..SchedulerConfig::default()
        };
        let executor = Arc::new(MaintenanceExecutor::new(
            relationship_service,
            resolver,
            instance_repo,
        ));
        run_scheduler(scheduler_config, executor).await;
        info!("Federation workers and scheduler started");
    } else {
        info!("Federation disabled; inbound entities queue but are not processed");
    }

    // Start server with graceful shutdown
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
