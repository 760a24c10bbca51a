//! Measurement evaluation pipeline.
//!
//! Measurement → threshold resolution → exceedance evaluation → per
//! exceedance deduplication → alert store. Dismissal lives here too because
//! it has to clear the notification rate limit of the alert's artifact.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Alert, Artifact, Measurement, Thresholds};
use crate::notify::RateLimiter;
use crate::store::{timed, AlertStore, ArtifactStore};

mod dedup;
mod evaluator;
mod thresholds;

pub use dedup::{is_significant_change, DedupOutcome, Deduplicator};
pub use evaluator::{find_exceedances, CO2_FALLBACK_UPPER, MOLD_RISK_HIGH, MOLD_RISK_THRESHOLD};
pub use thresholds::resolve_thresholds;

// ---

/// Result of [`Engine::dismiss`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dismissal {
    NotFound,
    AlreadyDismissed,
    Dismissed,
}

impl Dismissal {
    pub fn is_dismissed(self) -> bool {
        self == Dismissal::Dismissed
    }
}

/// Tunables for [`Engine`].
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Upper bound on every alert/artifact store call.
    pub store_timeout: Duration,
    /// Measurements evaluated concurrently at most.
    pub max_in_flight: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            max_in_flight: 32,
        }
    }
}

pub struct Engine {
    // ---
    alerts: Arc<dyn AlertStore>,
    artifacts: Arc<dyn ArtifactStore>,
    dedup: Deduplicator,
    limiter: Arc<RateLimiter>,
    permits: Arc<Semaphore>,
    store_timeout: Duration,
}

impl Engine {
    // ---
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        artifacts: Arc<dyn ArtifactStore>,
        limiter: Arc<RateLimiter>,
        settings: EngineSettings,
    ) -> Self {
        // ---
        Self {
            dedup: Deduplicator::new(alerts.clone(), settings.store_timeout),
            alerts,
            artifacts,
            limiter,
            permits: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            store_timeout: settings.store_timeout,
        }
    }

    /// Evaluate one measurement, returning the alert each exceedance
    /// resolved to (new, superseding, or the open one it was folded into).
    ///
    /// An empty vector means nothing was exceeded or the measurement was
    /// already processed. On `Err` the measurement counts as unprocessed and
    /// can be resubmitted.
    pub async fn evaluate(&self, measurement: &Measurement) -> Result<Vec<Alert>, EngineError> {
        self.evaluate_at(measurement, Utc::now()).await
    }

    pub async fn evaluate_at(
        &self,
        measurement: &Measurement,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, EngineError> {
        // ---
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EngineError::Worker(e.to_string()))?;
        self.run(measurement, now).await
    }

    // Caller holds a permit.
    async fn run(
        &self,
        measurement: &Measurement,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, EngineError> {
        // ---
        let thresholds = self.thresholds_for(measurement.artifact_id).await?;
        let exceedances = find_exceedances(measurement, &thresholds);
        if exceedances.is_empty() {
            debug!(measurement_id = %measurement.id, "No exceedances");
            return Ok(Vec::new());
        }

        let mut alerts = Vec::with_capacity(exceedances.len());
        for exceedance in &exceedances {
            let outcome = self.dedup.process(measurement, exceedance, now).await?;
            alerts.extend(outcome.into_alert());
        }
        Ok(alerts)
    }

    /// Evaluate a batch concurrently, bounded by `max_in_flight`.
    ///
    /// A permit is taken before each task is spawned, so at most
    /// `max_in_flight` tasks exist at once. Every measurement is attempted;
    /// if any failed the first error is returned and the caller resubmits
    /// the batch.
    pub async fn evaluate_batch(
        self: &Arc<Self>,
        measurements: Vec<Measurement>,
    ) -> Result<Vec<Alert>, EngineError> {
        // ---
        let now = Utc::now();
        let mut tasks = JoinSet::new();
        for (index, measurement) in measurements.into_iter().enumerate() {
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Worker(e.to_string()))?;
            let engine = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = permit;
                (index, engine.run(&measurement, now).await)
            });
        }

        let mut results = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(alerts))) => results.push((index, alerts)),
                Ok((_, Err(e))) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(EngineError::Worker(e.to_string()));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().flat_map(|(_, alerts)| alerts).collect())
    }

    /// Resolved thresholds for an artifact. Unknown artifacts are unbounded.
    pub async fn thresholds_for(&self, artifact_id: i64) -> Result<Thresholds, EngineError> {
        // ---
        match self.artifact(artifact_id).await? {
            Some(artifact) => Ok(resolve_thresholds(&artifact)),
            None => {
                debug!(artifact_id, "Unknown artifact, thresholds unbounded");
                Ok(Thresholds::default())
            }
        }
    }

    pub async fn artifact(&self, artifact_id: i64) -> Result<Option<Artifact>, EngineError> {
        // ---
        Ok(timed(
            self.store_timeout,
            self.artifacts.get_artifact_with_materials(artifact_id),
        )
        .await?)
    }

    pub async fn alert(&self, alert_id: Uuid) -> Result<Option<Alert>, EngineError> {
        Ok(timed(self.store_timeout, self.alerts.find_by_id(alert_id)).await?)
    }

    pub async fn active_alerts(
        &self,
    ) -> Result<std::collections::BTreeMap<i64, Vec<Alert>>, EngineError> {
        // ---
        Ok(timed(self.store_timeout, self.alerts.list_active_grouped_by_artifact()).await?)
    }

    /// Dismiss an alert and clear its artifact's notification rate limit.
    pub async fn dismiss(&self, alert_id: Uuid) -> Result<Dismissal, EngineError> {
        self.dismiss_at(alert_id, Utc::now()).await
    }

    pub async fn dismiss_at(
        &self,
        alert_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Dismissal, EngineError> {
        // ---
        let Some(alert) = self.alert(alert_id).await? else {
            return Ok(Dismissal::NotFound);
        };

        let dismissed = timed(self.store_timeout, self.alerts.mark_dismissed(alert_id, now)).await?;
        if !dismissed {
            return Ok(Dismissal::AlreadyDismissed);
        }

        self.limiter.clear(alert.artifact_id);
        info!(
            alert_id = %alert_id,
            artifact_id = alert.artifact_id,
            "Alert dismissed, rate limit cleared"
        );
        Ok(Dismissal::Dismissed)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::error::StoreError;
    use crate::models::{AlertStatus, Bounds, ExceededBound, Material, Property};
    use crate::store::{MemoryAlertStore, MemoryArtifactStore};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store whose inserts can fail or stall.
    #[derive(Default)]
    struct FaultyAlertStore {
        inner: MemoryAlertStore,
        inserts: AtomicUsize,
        fail_insert: Option<usize>,
        stall_inserts: bool,
    }

    #[async_trait]
    impl AlertStore for FaultyAlertStore {
        async fn find_by_measurement(
            &self,
            measurement_id: Uuid,
            property: Property,
            direction: ExceededBound,
        ) -> Result<Option<Alert>, StoreError> {
            self.inner.find_by_measurement(measurement_id, property, direction).await
        }

        async fn find_active_matching(
            &self,
            artifact_id: i64,
            property: Property,
            direction: ExceededBound,
            created_after: DateTime<Utc>,
        ) -> Result<Vec<Alert>, StoreError> {
            self.inner
                .find_active_matching(artifact_id, property, direction, created_after)
                .await
        }

        async fn insert(&self, alert: Alert) -> Result<Alert, StoreError> {
            // ---
            let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.stall_inserts {
                std::future::pending::<()>().await;
            }
            if self.fail_insert == Some(n) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.insert(alert).await
        }

        async fn mark_dismissed(
            &self,
            alert_id: Uuid,
            dismissed_at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            self.inner.mark_dismissed(alert_id, dismissed_at).await
        }

        async fn list_active_grouped_by_artifact(
            &self,
        ) -> Result<BTreeMap<i64, Vec<Alert>>, StoreError> {
            self.inner.list_active_grouped_by_artifact().await
        }

        async fn find_by_id(&self, alert_id: Uuid) -> Result<Option<Alert>, StoreError> {
            self.inner.find_by_id(alert_id).await
        }
    }

    /// Artifact store that holds every lookup until the gate opens.
    struct GatedArtifacts {
        entered: AtomicUsize,
        gate: Semaphore,
    }

    impl GatedArtifacts {
        fn closed() -> Self {
            Self {
                entered: AtomicUsize::new(0),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl ArtifactStore for GatedArtifacts {
        async fn get_artifact_with_materials(
            &self,
            _artifact_id: i64,
        ) -> Result<Option<Artifact>, StoreError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let _open = self.gate.acquire().await;
            Ok(None)
        }
    }

    fn faulty_engine(store: &Arc<FaultyAlertStore>, store_timeout: Duration) -> Engine {
        // ---
        Engine::new(
            store.clone(),
            Arc::new(MemoryArtifactStore::with_artifacts([painting()])),
            Arc::new(RateLimiter::from_minutes(30)),
            EngineSettings {
                store_timeout,
                max_in_flight: 4,
            },
        )
    }

    fn painting() -> Artifact {
        // ---
        Artifact {
            id: 1,
            name: "Sunflowers".to_string(),
            materials: vec![
                Material {
                    id: 1,
                    name: "oil paint".to_string(),
                    bounds: BTreeMap::from([
                        (Property::Temperature, Bounds::new(Some(10.0), Some(30.0))),
                        (Property::Humidity, Bounds::new(Some(40.0), Some(65.0))),
                    ]),
                },
                Material {
                    id: 2,
                    name: "canvas".to_string(),
                    bounds: BTreeMap::from([(
                        Property::Temperature,
                        Bounds::new(Some(15.0), Some(25.0)),
                    )]),
                },
            ],
        }
    }

    fn measurement(temperature: f64) -> Measurement {
        // ---
        Measurement {
            id: Uuid::new_v4(),
            device_id: "device-A".to_string(),
            artifact_id: 1,
            timestamp: Utc::now(),
            temperature: Some(temperature),
            humidity: Some(50.0),
            co2: None,
            air_pressure: None,
            illuminance: None,
            mold_risk_level: None,
        }
    }

    fn engine(store: &Arc<MemoryAlertStore>, limiter: &Arc<RateLimiter>) -> Arc<Engine> {
        // ---
        Arc::new(Engine::new(
            store.clone(),
            Arc::new(MemoryArtifactStore::with_artifacts([painting()])),
            limiter.clone(),
            EngineSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_evaluate_uses_intersected_thresholds() {
        // ---
        let store = Arc::new(MemoryAlertStore::new());
        let e = engine(&store, &Arc::new(RateLimiter::from_minutes(30)));

        // 27 is inside the oil paint range but above the canvas ceiling
        let alerts = e.evaluate(&measurement(27.0)).await.unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].property, Property::Temperature);
        assert_eq!(alerts[0].exceeded_bound, ExceededBound::Upper);
        assert_eq!(alerts[0].threshold_value, 25.0);
    }

    #[tokio::test]
    async fn test_evaluate_twice_creates_one_alert() {
        // ---
        let store = Arc::new(MemoryAlertStore::new());
        let e = engine(&store, &Arc::new(RateLimiter::from_minutes(30)));
        let m = measurement(27.0);

        let first = e.evaluate(&m).await.unwrap();
        let second = e.evaluate(&m).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_suppressed_exceedance_returns_open_alert() {
        // ---
        let store = Arc::new(MemoryAlertStore::new());
        let e = engine(&store, &Arc::new(RateLimiter::from_minutes(30)));
        let now = Utc::now();

        let first = e.evaluate_at(&measurement(26.0), now - ChronoDuration::hours(2)).await.unwrap();
        let second = e.evaluate_at(&measurement(27.0), now).await.unwrap();

        assert_eq!(second, first);
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_artifact_still_gets_fallback_rules() {
        // ---
        let store = Arc::new(MemoryAlertStore::new());
        let e = engine(&store, &Arc::new(RateLimiter::from_minutes(30)));
        let mut m = measurement(100.0);
        m.artifact_id = 99;
        m.co2 = Some(650.0);
        m.mold_risk_level = Some(2);

        let alerts = e.evaluate(&m).await.unwrap();

        let properties: Vec<Property> = alerts.iter().map(|a| a.property).collect();
        assert_eq!(properties, vec![Property::Co2, Property::MoldRiskLevel]);
    }

    #[tokio::test]
    async fn test_batch_evaluation_keeps_input_order() {
        // ---
        let store = Arc::new(MemoryAlertStore::new());
        let e = engine(&store, &Arc::new(RateLimiter::from_minutes(30)));
        let mut cold = measurement(5.0);
        cold.humidity = Some(80.0);

        let alerts = e
            .evaluate_batch(vec![measurement(20.0), cold, measurement(20.0)])
            .await
            .unwrap();

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].property, Property::Temperature);
        assert_eq!(alerts[0].exceeded_bound, ExceededBound::Lower);
        assert_eq!(alerts[1].property, Property::Humidity);
    }

    #[tokio::test]
    async fn test_batch_spawns_at_most_max_in_flight_tasks() {
        // ---
        let artifacts = Arc::new(GatedArtifacts::closed());
        let e = Arc::new(Engine::new(
            Arc::new(MemoryAlertStore::new()),
            artifacts.clone(),
            Arc::new(RateLimiter::from_minutes(30)),
            EngineSettings {
                store_timeout: Duration::from_secs(5),
                max_in_flight: 2,
            },
        ));
        let batch: Vec<Measurement> = (0..10)
            .map(|i| {
                let mut m = measurement(20.0);
                m.artifact_id = 100 + i;
                m.co2 = Some(650.0);
                m
            })
            .collect();

        let running = tokio::spawn({
            let e = e.clone();
            async move { e.evaluate_batch(batch).await }
        });
        while artifacts.entered.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        // this test, the batch task, and two running workers
        assert!(Arc::strong_count(&e) <= 4, "{} engine handles", Arc::strong_count(&e));
        assert_eq!(artifacts.entered.load(Ordering::SeqCst), 2);

        artifacts.gate.add_permits(10);
        let alerts = running.await.unwrap().unwrap();
        assert_eq!(alerts.len(), 10);
        assert!(alerts.iter().all(|a| a.property == Property::Co2));
    }

    #[tokio::test]
    async fn test_failed_insert_is_a_storage_error() {
        // ---
        let store = Arc::new(FaultyAlertStore {
            fail_insert: Some(1),
            ..Default::default()
        });
        let e = faulty_engine(&store, Duration::from_secs(5));

        let result = e.evaluate(&measurement(27.0)).await;

        assert!(matches!(result, Err(EngineError::Storage(StoreError::Database(_)))));
        assert!(store.inner.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_insert_times_out() {
        // ---
        let store = Arc::new(FaultyAlertStore {
            stall_inserts: true,
            ..Default::default()
        });
        let e = faulty_engine(&store, Duration::from_millis(50));

        let result = e.evaluate(&measurement(27.0)).await;

        assert!(matches!(result, Err(EngineError::Storage(StoreError::Timeout(_)))));
    }

    #[tokio::test]
    async fn test_retry_after_partial_failure_records_missing_alert() {
        // ---
        let store = Arc::new(FaultyAlertStore {
            fail_insert: Some(2),
            ..Default::default()
        });
        let e = faulty_engine(&store, Duration::from_secs(5));
        let mut m = measurement(27.0);
        m.humidity = Some(80.0);

        // temperature is stored, humidity fails
        assert!(e.evaluate(&m).await.is_err());
        assert_eq!(store.inner.all().await.len(), 1);

        let retried = e.evaluate(&m).await.unwrap();
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].property, Property::Humidity);

        let stored = store.inner.all().await;
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|a| a.measurement_id == Some(m.id)));
    }

    #[tokio::test]
    async fn test_dismiss_marks_alert_and_clears_limiter() {
        // ---
        let store = Arc::new(MemoryAlertStore::new());
        let limiter = Arc::new(RateLimiter::from_minutes(30));
        let e = engine(&store, &limiter);
        let now = Utc::now();

        let alert = e.evaluate(&measurement(27.0)).await.unwrap().remove(0);
        limiter.try_begin(1, now).unwrap().succeed(now);

        assert_eq!(e.dismiss(alert.id).await.unwrap(), Dismissal::Dismissed);
        assert_eq!(e.dismiss(alert.id).await.unwrap(), Dismissal::AlreadyDismissed);
        assert_eq!(e.dismiss(Uuid::new_v4()).await.unwrap(), Dismissal::NotFound);

        assert_eq!(limiter.last_sent_at(1), None);
        let stored = e.alert(alert.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Dismissed);
        assert!(stored.dismissed_at.is_some());
        assert!(e.active_alerts().await.unwrap().is_empty());
    }
}
