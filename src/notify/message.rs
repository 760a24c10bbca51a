//! Aggregated notification text for one artifact.

use std::fmt::Write;

use crate::models::{Alert, ExceededBound};

// ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Render one message listing every active alert of an artifact.
pub fn render_message(artifact_name: &str, alerts: &[Alert]) -> Message {
    // ---
    let plural = if alerts.len() == 1 { "" } else { "s" };
    let subject = format!(
        "[conservation] {} active alert{} for {}",
        alerts.len(),
        plural,
        artifact_name
    );

    let mut body = String::new();
    for alert in alerts {
        let side = match alert.exceeded_bound {
            ExceededBound::Upper => "above",
            ExceededBound::Lower => "below",
        };
        let unit = alert.property.unit();
        // Writing into a String cannot fail
        let _ = writeln!(
            body,
            "- {} {} limit: measured {}{}, threshold {}{} (since {})",
            alert.property,
            side,
            alert.measured_value,
            unit,
            alert.threshold_value,
            unit,
            alert.created_at.format("%Y-%m-%d %H:%M UTC"),
        );
    }

    Message { subject, body }
}
