//! Storage boundary of the engine.
//!
//! The engine only ever talks to the two traits below. `postgres` backs them
//! with `sqlx`, `memory` keeps everything in process for tests and embedding.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Alert, Artifact, ExceededBound, Property};

mod memory;
mod postgres;

pub use memory::{MemoryAlertStore, MemoryArtifactStore};
pub use postgres::{PgAlertStore, PgArtifactStore};

// ---

/// Durable alert records.
#[async_trait]
pub trait AlertStore: Send + Sync {
    // ---
    /// Alert already recorded for this measurement, property and direction.
    async fn find_by_measurement(
        &self,
        measurement_id: Uuid,
        property: Property,
        direction: ExceededBound,
    ) -> Result<Option<Alert>, StoreError>;

    /// Active alerts for the key created strictly after `created_after`,
    /// newest first.
    async fn find_active_matching(
        &self,
        artifact_id: i64,
        property: Property,
        direction: ExceededBound,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError>;

    async fn insert(&self, alert: Alert) -> Result<Alert, StoreError>;

    /// Transition an active alert to dismissed. `false` when the alert is
    /// unknown or already dismissed.
    async fn mark_dismissed(
        &self,
        alert_id: Uuid,
        dismissed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Every active alert keyed by artifact, oldest first within a group.
    async fn list_active_grouped_by_artifact(
        &self,
    ) -> Result<BTreeMap<i64, Vec<Alert>>, StoreError>;

    async fn find_by_id(&self, alert_id: Uuid) -> Result<Option<Alert>, StoreError>;
}

/// Artifact and material configuration.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// `None` when the artifact is unknown.
    async fn get_artifact_with_materials(
        &self,
        artifact_id: i64,
    ) -> Result<Option<Artifact>, StoreError>;
}

/// Bound a store call by `limit`.
pub async fn timed<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    // ---
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
