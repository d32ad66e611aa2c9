//! Scheduled jobs for periodic maintenance.
//!
//! Two loops run alongside the workers: expired mutes are swept back to
//! unmuted, and instances whose cached metadata has aged past its TTL are
//! refetched so key rotations propagate without waiting for inbound traffic.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};
use versia_common::AppResult;
use versia_core::RelationshipService;
use versia_db::repositories::InstanceRepository;
use versia_federation::EntityResolver;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval for the expired-mute sweep (default: 1 minute).
    pub mute_sweep_interval: Duration,
    /// Interval for the stale-instance refresh (default: 1 hour).
    pub instance_refresh_interval: Duration,
    /// Age after which cached instance metadata counts as stale.
    pub instance_stale_after: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mute_sweep_interval: Duration::from_secs(60),
            instance_refresh_interval: Duration::from_secs(3600),
            instance_stale_after: chrono::Duration::hours(24),
        }
    }
}

/// Executes the periodic maintenance jobs.
#[derive(Clone)]
pub struct MaintenanceExecutor {
    relationships: RelationshipService,
    resolver: EntityResolver,
    instance_repo: InstanceRepository,
}

impl MaintenanceExecutor {
    /// Create a new maintenance executor.
    #[must_use]
    pub const fn new(
        relationships: RelationshipService,
        resolver: EntityResolver,
        instance_repo: InstanceRepository,
    ) -> Self {
        Self {
            relationships,
            resolver,
            instance_repo,
        }
    }

    /// Clear mute facets whose expiry has passed. Returns the number of
    /// edges swept.
    pub async fn sweep_expired_mutes(&self) -> AppResult<u64> {
        self.relationships.sweep_expired_mutes(Utc::now()).await
    }

    /// Force-refresh instances whose metadata has aged out.
    pub async fn refresh_stale_instances(
        &self,
        stale_after: chrono::Duration,
    ) -> AppResult<u64> {
        let cutoff = Utc::now() - stale_after;
        let stale = self.instance_repo.find_stale(cutoff).await?;

        let mut refreshed = 0;
        for instance in stale {
            match self.resolver.resolve_instance(&instance.host, true).await {
                Ok(_) => refreshed += 1,
                Err(e) => {
                    // The next tick tries again; unreachable hosts stay stale.
                    warn!(host = %instance.host, error = %e, "Stale instance refresh failed");
                }
            }
        }

        Ok(refreshed)
    }
}

/// Run the scheduler with the given configuration and executor.
pub async fn run_scheduler(config: SchedulerConfig, executor: Arc<MaintenanceExecutor>) {
    let executor_mutes = executor.clone();
    let executor_instances = executor;

    let mute_interval = config.mute_sweep_interval;
    let refresh_interval = config.instance_refresh_interval;
    let stale_after = config.instance_stale_after;

    tokio::spawn(async move {
        let mut interval = interval(mute_interval);
        loop {
            interval.tick().await;
            match executor_mutes.sweep_expired_mutes().await {
                Ok(count) => {
                    if count > 0 {
                        info!(count, "Swept expired mutes");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to sweep expired mutes");
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = interval(refresh_interval);
        loop {
            interval.tick().await;
            match executor_instances.refresh_stale_instances(stale_after).await {
                Ok(count) => {
                    if count > 0 {
                        info!(count, "Refreshed stale instances");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to refresh stale instances");
                }
            }
        }
    });
}
