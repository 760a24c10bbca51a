//! PostgreSQL-backed stores.
//!
//! Tables are created by `schema::create_schema`. Enum columns are stored as
//! TEXT using the names from `Property::as_str` and friends.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AlertStore, ArtifactStore};
use crate::error::StoreError;
use crate::models::{Alert, AlertStatus, Artifact, Bounds, ExceededBound, Material, Property};

const ALERT_COLUMNS: &str = "id, artifact_id, device_id, measurement_id, property, \
     exceeded_bound, measured_value, threshold_value, status, created_at, dismissed_at";

// ---

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    // ---
    id: Uuid,
    artifact_id: i64,
    device_id: Option<String>,
    measurement_id: Option<Uuid>,
    property: String,
    exceeded_bound: String,
    measured_value: f64,
    threshold_value: f64,
    status: String,
    created_at: DateTime<Utc>,
    dismissed_at: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        // ---
        Ok(Alert {
            id: row.id,
            artifact_id: row.artifact_id,
            device_id: row.device_id,
            measurement_id: row.measurement_id,
            property: row.property.parse().map_err(StoreError::Corrupt)?,
            exceeded_bound: row.exceeded_bound.parse().map_err(StoreError::Corrupt)?,
            measured_value: row.measured_value,
            threshold_value: row.threshold_value,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            dismissed_at: row.dismissed_at,
        })
    }
}

fn into_alerts(rows: Vec<AlertRow>) -> Result<Vec<Alert>, StoreError> {
    rows.into_iter().map(Alert::try_from).collect()
}

/// Alert store over the `alerts` table.
#[derive(Debug, Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    // ---
    async fn find_by_measurement(
        &self,
        measurement_id: Uuid,
        property: Property,
        direction: ExceededBound,
    ) -> Result<Option<Alert>, StoreError> {
        // ---
        let row: Option<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE measurement_id = $1 AND property = $2 AND exceeded_bound = $3 \
             LIMIT 1"
        ))
        .bind(measurement_id)
        .bind(property.as_str())
        .bind(direction.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Alert::try_from).transpose()
    }

    async fn find_active_matching(
        &self,
        artifact_id: i64,
        property: Property,
        direction: ExceededBound,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError> {
        // ---
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE artifact_id = $1 AND property = $2 AND exceeded_bound = $3 \
               AND status = 'active' AND created_at > $4 \
             ORDER BY created_at DESC"
        ))
        .bind(artifact_id)
        .bind(property.as_str())
        .bind(direction.as_str())
        .bind(created_after)
        .fetch_all(&self.pool)
        .await?;

        into_alerts(rows)
    }

    async fn insert(&self, alert: Alert) -> Result<Alert, StoreError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, artifact_id, device_id, measurement_id, property,
                exceeded_bound, measured_value, threshold_value, status,
                created_at, dismissed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(alert.id)
        .bind(alert.artifact_id)
        .bind(&alert.device_id)
        .bind(alert.measurement_id)
        .bind(alert.property.as_str())
        .bind(alert.exceeded_bound.as_str())
        .bind(alert.measured_value)
        .bind(alert.threshold_value)
        .bind(alert.status.as_str())
        .bind(alert.created_at)
        .bind(alert.dismissed_at)
        .execute(&self.pool)
        .await?;

        Ok(alert)
    }

    async fn mark_dismissed(
        &self,
        alert_id: Uuid,
        dismissed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // ---
        let result = sqlx::query(
            r#"
            UPDATE alerts
               SET status = $2, dismissed_at = $3
             WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(alert_id)
        .bind(AlertStatus::Dismissed.as_str())
        .bind(dismissed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_active_grouped_by_artifact(
        &self,
    ) -> Result<BTreeMap<i64, Vec<Alert>>, StoreError> {
        // ---
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE status = 'active' \
             ORDER BY artifact_id, created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: BTreeMap<i64, Vec<Alert>> = BTreeMap::new();
        for alert in into_alerts(rows)? {
            grouped.entry(alert.artifact_id).or_default().push(alert);
        }
        Ok(grouped)
    }

    async fn find_by_id(&self, alert_id: Uuid) -> Result<Option<Alert>, StoreError> {
        // ---
        let row: Option<AlertRow> =
            sqlx::query_as(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1"))
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Alert::try_from).transpose()
    }
}

// ---

#[derive(Debug, sqlx::FromRow)]
struct MaterialRow {
    // ---
    id: i64,
    name: String,
    temperature_lower: Option<f64>,
    temperature_upper: Option<f64>,
    humidity_lower: Option<f64>,
    humidity_upper: Option<f64>,
    co2_lower: Option<f64>,
    co2_upper: Option<f64>,
    air_pressure_lower: Option<f64>,
    air_pressure_upper: Option<f64>,
    illuminance_lower: Option<f64>,
    illuminance_upper: Option<f64>,
    mold_risk_level_lower: Option<f64>,
    mold_risk_level_upper: Option<f64>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        // ---
        let pairs = [
            (Property::Temperature, row.temperature_lower, row.temperature_upper),
            (Property::Humidity, row.humidity_lower, row.humidity_upper),
            (Property::Co2, row.co2_lower, row.co2_upper),
            (Property::AirPressure, row.air_pressure_lower, row.air_pressure_upper),
            (Property::Illuminance, row.illuminance_lower, row.illuminance_upper),
            (
                Property::MoldRiskLevel,
                row.mold_risk_level_lower,
                row.mold_risk_level_upper,
            ),
        ];

        let bounds = pairs
            .into_iter()
            .map(|(p, lower, upper)| (p, Bounds::new(lower, upper)))
            .filter(|(_, b)| !b.is_unbounded())
            .collect();

        Material {
            id: row.id,
            name: row.name,
            bounds,
        }
    }
}

/// Artifact configuration over `artifacts`, `materials` and
/// `artifact_materials`.
#[derive(Debug, Clone)]
pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn get_artifact_with_materials(
        &self,
        artifact_id: i64,
    ) -> Result<Option<Artifact>, StoreError> {
        // ---
        let header: Option<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM artifacts WHERE id = $1")
                .bind(artifact_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, name)) = header else {
            return Ok(None);
        };

        let rows: Vec<MaterialRow> = sqlx::query_as(
            r#"
            SELECT m.*
              FROM materials m
              JOIN artifact_materials am ON am.material_id = m.id
             WHERE am.artifact_id = $1
             ORDER BY m.id
            "#,
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Artifact {
            id,
            name,
            materials: rows.into_iter().map(Material::from).collect(),
        }))
    }
}
