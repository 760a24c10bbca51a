//! Database schema management for `conservation-monitor`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the artifact configuration tables (`artifacts`, `materials`,
/// `artifact_materials`) and the `alerts` table. Safe to call on every
/// startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id    BIGSERIAL PRIMARY KEY,
            name  TEXT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // One nullable lower/upper pair per tracked property; NULL = unbounded
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS materials (
            id                    BIGSERIAL PRIMARY KEY,
            name                  TEXT NOT NULL,
            temperature_lower     DOUBLE PRECISION,
            temperature_upper     DOUBLE PRECISION,
            humidity_lower        DOUBLE PRECISION,
            humidity_upper        DOUBLE PRECISION,
            co2_lower             DOUBLE PRECISION,
            co2_upper             DOUBLE PRECISION,
            air_pressure_lower    DOUBLE PRECISION,
            air_pressure_upper    DOUBLE PRECISION,
            illuminance_lower     DOUBLE PRECISION,
            illuminance_upper     DOUBLE PRECISION,
            mold_risk_level_lower DOUBLE PRECISION,
            mold_risk_level_upper DOUBLE PRECISION
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifact_materials (
            artifact_id BIGINT NOT NULL REFERENCES artifacts (id),
            material_id BIGINT NOT NULL REFERENCES materials (id),
            PRIMARY KEY (artifact_id, material_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Alerts are never deleted; dismissal only flips status
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id               UUID PRIMARY KEY,
            artifact_id      BIGINT           NOT NULL,
            device_id        TEXT,
            measurement_id   UUID,
            property         TEXT             NOT NULL,
            exceeded_bound   TEXT             NOT NULL,
            measured_value   DOUBLE PRECISION NOT NULL,
            threshold_value  DOUBLE PRECISION NOT NULL,
            status           TEXT             NOT NULL DEFAULT 'active',
            created_at       TIMESTAMPTZ      NOT NULL,
            dismissed_at     TIMESTAMPTZ
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_dedup_key
            ON alerts (artifact_id, property, exceeded_bound, status, created_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_measurement_id
            ON alerts (measurement_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
