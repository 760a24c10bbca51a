//! In-process store implementations.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AlertStore, ArtifactStore};
use crate::error::StoreError;
use crate::models::{Alert, AlertStatus, Artifact, ExceededBound, Property};

// ---

/// Alert rows held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    alerts: RwLock<Vec<Alert>>,
}

impl MemoryAlertStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, active or not.
    pub async fn all(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    // ---
    async fn find_by_measurement(
        &self,
        measurement_id: Uuid,
        property: Property,
        direction: ExceededBound,
    ) -> Result<Option<Alert>, StoreError> {
        // ---
        let alerts = self.alerts.read().await;
        Ok(alerts
            .iter()
            .find(|a| {
                a.measurement_id == Some(measurement_id)
                    && a.property == property
                    && a.exceeded_bound == direction
            })
            .cloned())
    }

    async fn find_active_matching(
        &self,
        artifact_id: i64,
        property: Property,
        direction: ExceededBound,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError> {
        // ---
        let alerts = self.alerts.read().await;
        let mut found: Vec<Alert> = alerts
            .iter()
            .filter(|a| {
                a.is_active()
                    && a.artifact_id == artifact_id
                    && a.property == property
                    && a.exceeded_bound == direction
                    && a.created_at > created_after
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn insert(&self, alert: Alert) -> Result<Alert, StoreError> {
        // ---
        let mut alerts = self.alerts.write().await;
        if alerts.iter().any(|a| a.id == alert.id) {
            return Err(StoreError::Corrupt(format!("duplicate alert id {}", alert.id)));
        }
        alerts.push(alert.clone());
        Ok(alert)
    }

    async fn mark_dismissed(
        &self,
        alert_id: Uuid,
        dismissed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // ---
        let mut alerts = self.alerts.write().await;
        match alerts.iter_mut().find(|a| a.id == alert_id && a.is_active()) {
            Some(alert) => {
                alert.status = AlertStatus::Dismissed;
                alert.dismissed_at = Some(dismissed_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_active_grouped_by_artifact(
        &self,
    ) -> Result<BTreeMap<i64, Vec<Alert>>, StoreError> {
        // ---
        let alerts = self.alerts.read().await;
        let mut grouped: BTreeMap<i64, Vec<Alert>> = BTreeMap::new();
        for alert in alerts.iter().filter(|a| a.is_active()) {
            grouped.entry(alert.artifact_id).or_default().push(alert.clone());
        }
        for group in grouped.values_mut() {
            group.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
        Ok(grouped)
    }

    async fn find_by_id(&self, alert_id: Uuid) -> Result<Option<Alert>, StoreError> {
        Ok(self.alerts.read().await.iter().find(|a| a.id == alert_id).cloned())
    }
}

/// Artifact configuration held in memory.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<i64, Artifact>>,
}

impl MemoryArtifactStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        // ---
        Self {
            artifacts: RwLock::new(artifacts.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    pub async fn upsert(&self, artifact: Artifact) {
        self.artifacts.write().await.insert(artifact.id, artifact);
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get_artifact_with_materials(
        &self,
        artifact_id: i64,
    ) -> Result<Option<Artifact>, StoreError> {
        Ok(self.artifacts.read().await.get(&artifact_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Duration;

    fn alert(artifact_id: i64, created_at: DateTime<Utc>) -> Alert {
        // ---
        Alert {
            id: Uuid::new_v4(),
            artifact_id,
            device_id: None,
            measurement_id: Some(Uuid::new_v4()),
            property: Property::Temperature,
            exceeded_bound: ExceededBound::Upper,
            measured_value: 26.0,
            threshold_value: 25.0,
            status: AlertStatus::Active,
            created_at,
            dismissed_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_active_matching_is_newest_first_and_windowed() {
        // ---
        let store = MemoryAlertStore::new();
        let now = Utc::now();
        let old = store.insert(alert(1, now - Duration::hours(25))).await.unwrap();
        let older = store.insert(alert(1, now - Duration::hours(5))).await.unwrap();
        let newer = store.insert(alert(1, now - Duration::hours(1))).await.unwrap();

        let found = store
            .find_active_matching(1, Property::Temperature, ExceededBound::Upper, now - Duration::hours(24))
            .await
            .unwrap();

        let ids: Vec<Uuid> = found.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert!(!ids.contains(&old.id));
    }

    #[tokio::test]
    async fn test_dismissed_alerts_leave_active_listing() {
        // ---
        let store = MemoryAlertStore::new();
        let now = Utc::now();
        let a = store.insert(alert(1, now)).await.unwrap();
        let b = store.insert(alert(2, now)).await.unwrap();

        assert!(store.mark_dismissed(a.id, now).await.unwrap());
        assert!(!store.mark_dismissed(a.id, now).await.unwrap());

        let grouped = store.list_active_grouped_by_artifact().await.unwrap();
        assert!(!grouped.contains_key(&1));
        assert_eq!(grouped[&2][0].id, b.id);

        let stored = store.find_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Dismissed);
        assert_eq!(stored.dismissed_at, Some(now));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_a_store_error() {
        // ---
        let store = MemoryAlertStore::new();
        let a = alert(1, Utc::now());
        store.insert(a.clone()).await.unwrap();
        assert!(matches!(store.insert(a).await, Err(StoreError::Corrupt(_))));
    }
}
