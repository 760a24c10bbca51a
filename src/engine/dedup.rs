//! Alert deduplication.
//!
//! Decides per exceedance whether to record a new alert or fold it into an
//! already open one:
//!
//! 0. An alert already recorded for the same measurement, property and
//!    direction short-circuits (redelivery / retry).
//! 1. Active alerts for `(artifact, property, direction)` inside the
//!    property's lookback window are fetched, newest first.
//! 2. None found: a new alert is inserted.
//! 3. Found: the value drift against the newest alert decides. At or below
//!    the property's significance percentage the exceedance is suppressed and
//!    the open alert returned untouched; above it a new alert supersedes it.
//!
//! Superseding inserts a new row and leaves the previous one active, so two
//! active rows for one key can coexist until someone dismisses the older.
//!
//! The find-then-insert sequence runs under an async mutex keyed by the
//! dedup key so concurrent measurements cannot both observe "no match".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{Alert, ExceededBound, Exceedance, Measurement, Property};
use crate::store::{timed, AlertStore};

// ---

type DedupKey = (i64, Property, ExceededBound);

/// What happened to one exceedance.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupOutcome {
    /// The measurement was already processed for this property/direction.
    AlreadyProcessed,
    /// No open episode; a new alert was inserted.
    Created(Alert),
    /// Folded into the open alert, which is returned unchanged.
    Suppressed(Alert),
    /// Value drifted significantly; a new alert was inserted next to `previous`.
    Superseded { previous: Alert, alert: Alert },
}

impl DedupOutcome {
    // ---
    /// Alert handed back to the caller of `evaluate`, if any.
    pub fn into_alert(self) -> Option<Alert> {
        // ---
        match self {
            DedupOutcome::AlreadyProcessed => None,
            DedupOutcome::Created(alert)
            | DedupOutcome::Suppressed(alert)
            | DedupOutcome::Superseded { alert, .. } => Some(alert),
        }
    }
}

/// Whether `new_value` differs enough from `existing_value` to open a new
/// alert for `property`.
///
/// A zero stored value makes any nonzero new value significant. Drift is
/// measured against the magnitude of the stored value so sub-zero
/// temperatures compare the same way positive ones do.
pub fn is_significant_change(property: Property, existing_value: f64, new_value: f64) -> bool {
    // ---
    if existing_value == 0.0 {
        return new_value != 0.0;
    }
    let percent_change = (new_value - existing_value).abs() / existing_value.abs() * 100.0;
    percent_change > property.significance_percent()
}

/// Per-key async locks. The key space is bounded by artifacts × properties ×
/// directions, so entries are kept for the life of the process.
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<DedupKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    // ---
    async fn lock_for(&self, key: DedupKey) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(key).or_default().clone()
    }
}

/// Stateful deduplicator over an [`AlertStore`].
pub struct Deduplicator {
    // ---
    store: Arc<dyn AlertStore>,
    locks: KeyedLocks,
    store_timeout: Duration,
}

impl Deduplicator {
    // ---
    pub fn new(store: Arc<dyn AlertStore>, store_timeout: Duration) -> Self {
        // ---
        Self {
            store,
            locks: KeyedLocks::default(),
            store_timeout,
        }
    }

    /// Run one exceedance through the dedup steps at time `now`.
    pub async fn process(
        &self,
        measurement: &Measurement,
        exceedance: &Exceedance,
        now: DateTime<Utc>,
    ) -> Result<DedupOutcome, StoreError> {
        // ---
        let key = (measurement.artifact_id, exceedance.property, exceedance.direction);
        let lock = self.locks.lock_for(key).await;
        let _guard = lock.lock().await;

        // Step 0: idempotency
        let seen = timed(
            self.store_timeout,
            self.store
                .find_by_measurement(measurement.id, exceedance.property, exceedance.direction),
        )
        .await?;
        if seen.is_some() {
            debug!(
                measurement_id = %measurement.id,
                property = %exceedance.property,
                "Measurement already processed, skipping"
            );
            return Ok(DedupOutcome::AlreadyProcessed);
        }

        // Step 1: lookback window
        let created_after = now - exceedance.property.dedup_window();
        let open = timed(
            self.store_timeout,
            self.store.find_active_matching(
                measurement.artifact_id,
                exceedance.property,
                exceedance.direction,
                created_after,
            ),
        )
        .await?;

        let fresh = Alert::from_exceedance(measurement, exceedance, now);

        // Step 2: no open episode
        let Some(existing) = open.into_iter().next() else {
            let alert = timed(self.store_timeout, self.store.insert(fresh)).await?;
            info!(
                alert_id = %alert.id,
                artifact_id = alert.artifact_id,
                property = %alert.property,
                direction = alert.exceeded_bound.as_str(),
                value = alert.measured_value,
                threshold = alert.threshold_value,
                "Alert created"
            );
            return Ok(DedupOutcome::Created(alert));
        };

        // Step 3: significance test against the newest open alert
        if !is_significant_change(exceedance.property, existing.measured_value, exceedance.value) {
            debug!(
                alert_id = %existing.id,
                property = %exceedance.property,
                existing = existing.measured_value,
                value = exceedance.value,
                "Exceedance folded into open alert"
            );
            return Ok(DedupOutcome::Suppressed(existing));
        }

        let alert = timed(self.store_timeout, self.store.insert(fresh)).await?;
        info!(
            alert_id = %alert.id,
            previous_id = %existing.id,
            artifact_id = alert.artifact_id,
            property = %alert.property,
            previous_value = existing.measured_value,
            value = alert.measured_value,
            "Alert superseded by significant change"
        );
        Ok(DedupOutcome::Superseded {
            previous: existing,
            alert,
        })
    }
}
