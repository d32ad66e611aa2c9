//! Instance repository.

use std::sync::Arc;

use crate::entities::{Instance, instance};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use versia_common::{AppError, AppResult};

/// Instance repository for database operations.
#[derive(Clone)]
pub struct InstanceRepository {
    db: Arc<DatabaseConnection>,
}

impl InstanceRepository {
    /// Create a new instance repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an instance by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<instance::Model>> {
        Instance::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an instance by host.
    pub async fn find_by_host(&self, host: &str) -> AppResult<Option<instance::Model>> {
        Instance::find()
            .filter(instance::Column::Host.eq(host))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Check whether an instance is blocked.
    pub async fn is_blocked(&self, host: &str) -> AppResult<bool> {
        Ok(self
            .find_by_host(host)
            .await?
            .is_some_and(|i| i.is_blocked))
    }

    /// Create a new instance record.
    pub async fn create(&self, model: instance::ActiveModel) -> AppResult<instance::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update an instance record.
    pub async fn update(&self, model: instance::ActiveModel) -> AppResult<instance::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Instances whose cached metadata is older than the cutoff, including
    /// ones never fetched at all. Blocked instances are skipped.
    pub async fn find_stale(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> AppResult<Vec<instance::Model>> {
        Instance::find()
            .filter(instance::Column::IsBlocked.eq(false))
            .filter(
                Condition::any()
                    .add(instance::Column::LastFetchedAt.is_null())
                    .add(instance::Column::LastFetchedAt.lt(cutoff)),
            )
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Record a successful exchange with an instance.
    pub async fn touch_communicated(&self, id: &str) -> AppResult<()> {
        let active = instance::ActiveModel {
            id: Set(id.to_string()),
            last_communicated_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };
        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
