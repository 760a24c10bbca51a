//! Notification side of the engine.
//!
//! - `NotificationSender` trait with webhook and log implementations
//! - `RateLimiter` keyed by artifact, shared with the dismissal path
//! - `Dispatcher` that groups active alerts and sends one message per artifact

mod dispatcher;
mod message;
mod rate_limit;
mod sender;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use message::{render_message, Message};
pub use rate_limit::{RateLimiter, Reservation};
pub use sender::{LogSender, NotificationSender, WebhookSender};
