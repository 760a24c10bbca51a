//! Periodic, rate-limited delivery of active alerts.
//!
//! Each cycle groups active alerts by artifact and sends one aggregated
//! message per artifact whose rate-limit window has elapsed. Failures are
//! logged and retried on the next cycle; nothing here stops the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::message::render_message;
use super::rate_limit::RateLimiter;
use super::sender::NotificationSender;
use crate::error::SendError;
use crate::models::Alert;
use crate::store::{timed, AlertStore, ArtifactStore};

// ---

/// Outcome of one dispatch cycle, per artifact.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchReport {
    pub sent: Vec<i64>,
    pub rate_limited: Vec<i64>,
    pub failed: Vec<(i64, String)>,
}

pub struct Dispatcher {
    // ---
    alerts: Arc<dyn AlertStore>,
    artifacts: Arc<dyn ArtifactStore>,
    sender: Arc<dyn NotificationSender>,
    limiter: Arc<RateLimiter>,
    store_timeout: Duration,
    send_timeout: Duration,
}

impl Dispatcher {
    // ---
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        artifacts: Arc<dyn ArtifactStore>,
        sender: Arc<dyn NotificationSender>,
        limiter: Arc<RateLimiter>,
        store_timeout: Duration,
        send_timeout: Duration,
    ) -> Self {
        // ---
        Self {
            alerts,
            artifacts,
            sender,
            limiter,
            store_timeout,
            send_timeout,
        }
    }

    pub fn channel_name(&self) -> &str {
        self.sender.channel_name()
    }

    pub async fn dispatch(&self) -> DispatchReport {
        self.dispatch_at(Utc::now()).await
    }

    /// Run one cycle as of `now`.
    pub async fn dispatch_at(&self, now: DateTime<Utc>) -> DispatchReport {
        // ---
        let mut report = DispatchReport::default();

        let grouped = match timed(self.store_timeout, self.alerts.list_active_grouped_by_artifact()).await {
            Ok(grouped) => grouped,
            Err(e) => {
                error!(error = %e, "Failed to list active alerts, skipping dispatch cycle");
                return report;
            }
        };

        for (artifact_id, alerts) in grouped {
            // Released on drop if this cycle is cancelled mid-send.
            let Some(reservation) = self.limiter.try_begin(artifact_id, now) else {
                debug!(artifact_id, pending = alerts.len(), "Artifact rate limited");
                report.rate_limited.push(artifact_id);
                continue;
            };

            match self.notify_artifact(artifact_id, &alerts).await {
                Ok(()) => {
                    reservation.succeed(now);
                    info!(
                        artifact_id,
                        alerts = alerts.len(),
                        channel = self.sender.channel_name(),
                        "Notification delivered"
                    );
                    report.sent.push(artifact_id);
                }
                Err(e) => {
                    reservation.fail();
                    warn!(
                        artifact_id,
                        channel = self.sender.channel_name(),
                        error = %e,
                        "Notification delivery failed, will retry next cycle"
                    );
                    report.failed.push((artifact_id, e.to_string()));
                }
            }
        }

        report
    }

    async fn notify_artifact(&self, artifact_id: i64, alerts: &[Alert]) -> Result<(), SendError> {
        // ---
        let name = self.artifact_name(artifact_id).await;
        let message = render_message(&name, alerts);

        tokio::time::timeout(
            self.send_timeout,
            self.sender.send(artifact_id, &message.subject, &message.body),
        )
        .await
        .map_err(|_| SendError::Timeout(self.send_timeout))?
    }

    /// Display name for the artifact, falling back to its id.
    async fn artifact_name(&self, artifact_id: i64) -> String {
        // ---
        let lookup = timed(
            self.store_timeout,
            self.artifacts.get_artifact_with_materials(artifact_id),
        )
        .await;

        match lookup {
            Ok(Some(artifact)) => artifact.name,
            Ok(None) => format!("artifact {artifact_id}"),
            Err(e) => {
                warn!(artifact_id, error = %e, "Artifact lookup failed, using id in message");
                format!("artifact {artifact_id}")
            }
        }
    }

    /// Dispatch on a fixed interval until the task is dropped.
    pub async fn run(self: Arc<Self>, every: Duration) {
        // ---
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(interval_secs = every.as_secs(), "Notification dispatcher started");
        loop {
            ticker.tick().await;
            let report = self.dispatch().await;
            debug!(
                sent = report.sent.len(),
                rate_limited = report.rate_limited.len(),
                failed = report.failed.len(),
                "Dispatch cycle finished"
            );
        }
    }
}
