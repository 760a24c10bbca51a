//! Preservation alert engine.
//!
//! Environmental measurements taken near artifacts are checked against the
//! bounds of the materials each artifact is made of. Violations become
//! deduplicated alerts, and active alerts are delivered as one rate-limited
//! message per artifact.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): each
//! directory module is a gateway re-exporting what its siblings need.
//! - `engine` – threshold resolution, exceedance evaluation, deduplication
//! - `notify` – senders, rate limiting, dispatch
//! - `store` – alert/artifact storage traits with Postgres and memory backends
//! - `routes` – HTTP surface

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
pub use engine::{Dismissal, Engine, EngineSettings};
pub use error::{EngineError, SendError, StoreError};
pub use models::{
    Alert, AlertStatus, Artifact, Bounds, ExceededBound, Exceedance, Material, Measurement,
    Property, Thresholds,
};
pub use notify::{Dispatcher, NotificationSender, RateLimiter};
