//! Per-artifact notification rate limiting.
//!
//! One [`RateLimiter`] is shared between the dispatcher (which reserves and
//! records sends) and the engine (which clears an artifact on dismissal).
//! State is process local; losing it on restart costs at most one extra
//! notification per artifact.
//!
//! A send is bracketed by a [`Reservation`]. Dropping it without calling
//! [`Reservation::succeed`] releases the artifact, so a cancelled dispatch
//! cycle never leaves it locked. Every `clear` bumps the slot generation; a
//! success recorded under an older generation does not restore `last_sent_at`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

// ---

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    last_sent_at: Option<DateTime<Utc>>,
    in_flight: bool,
    generation: u64,
}

/// Minimum spacing between notifications for the same artifact.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    slots: Mutex<HashMap<i64, Slot>>,
}

impl RateLimiter {
    // ---
    pub fn new(window: Duration) -> Self {
        // ---
        Self {
            window,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_minutes(minutes: u32) -> Self {
        Self::new(Duration::minutes(i64::from(minutes)))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Held only for map updates, never across an await.
    fn slots(&self) -> MutexGuard<'_, HashMap<i64, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the artifact for a send at `now`.
    ///
    /// `None` while a previous send is inside the window or another send for
    /// the artifact is still in flight.
    pub fn try_begin(&self, artifact_id: i64, now: DateTime<Utc>) -> Option<Reservation<'_>> {
        // ---
        let mut slots = self.slots();
        let slot = slots.entry(artifact_id).or_default();

        if slot.in_flight {
            return None;
        }
        if let Some(last) = slot.last_sent_at {
            if now - last < self.window {
                return None;
            }
        }
        slot.in_flight = true;

        Some(Reservation {
            limiter: self,
            artifact_id,
            generation: slot.generation,
            settled: false,
        })
    }

    /// Forget the artifact's last send. Called when one of its alerts is
    /// dismissed.
    pub fn clear(&self, artifact_id: i64) {
        // ---
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(&artifact_id) {
            if slot.in_flight {
                slot.last_sent_at = None;
                slot.generation += 1;
            } else {
                slots.remove(&artifact_id);
            }
        }
    }

    pub fn last_sent_at(&self, artifact_id: i64) -> Option<DateTime<Utc>> {
        self.slots().get(&artifact_id).and_then(|s| s.last_sent_at)
    }

    fn settle(&self, artifact_id: i64, generation: u64, sent_at: Option<DateTime<Utc>>) {
        // ---
        if let Some(slot) = self.slots().get_mut(&artifact_id) {
            slot.in_flight = false;
            if slot.generation == generation {
                if let Some(sent_at) = sent_at {
                    slot.last_sent_at = Some(sent_at);
                }
            }
        }
    }
}

/// An in-flight send for one artifact. Released on drop.
#[derive(Debug)]
pub struct Reservation<'a> {
    limiter: &'a RateLimiter,
    artifact_id: i64,
    generation: u64,
    settled: bool,
}

impl Reservation<'_> {
    // ---
    /// Record a delivered message. Ignored for the window if the artifact was
    /// cleared while the send was in flight.
    pub fn succeed(mut self, now: DateTime<Utc>) {
        self.settled = true;
        self.limiter.settle(self.artifact_id, self.generation, Some(now));
    }

    /// Release without touching `last_sent_at`, so the next cycle retries.
    pub fn fail(self) {}
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        // ---
        if !self.settled {
            self.limiter.settle(self.artifact_id, self.generation, None);
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_window_blocks_until_elapsed() {
        // ---
        let limiter = RateLimiter::from_minutes(30);
        let t0 = Utc::now();

        limiter.try_begin(1, t0).unwrap().succeed(t0);

        assert!(limiter.try_begin(1, t0 + Duration::minutes(29)).is_none());
        assert!(limiter.try_begin(1, t0 + Duration::minutes(30)).is_some());
    }

    #[test]
    fn test_artifacts_are_independent() {
        // ---
        let limiter = RateLimiter::from_minutes(30);
        let t0 = Utc::now();

        limiter.try_begin(1, t0).unwrap().succeed(t0);
        assert!(limiter.try_begin(2, t0).is_some());
    }

    #[test]
    fn test_in_flight_send_blocks_second_reservation() {
        // ---
        let limiter = RateLimiter::from_minutes(30);
        let t0 = Utc::now();

        let reservation = limiter.try_begin(1, t0).unwrap();
        assert!(limiter.try_begin(1, t0).is_none());

        reservation.fail();
        assert!(limiter.try_begin(1, t0).is_some());
        assert_eq!(limiter.last_sent_at(1), None);
    }

    #[test]
    fn test_dropped_reservation_releases_artifact() {
        // ---
        let limiter = RateLimiter::from_minutes(30);
        let t0 = Utc::now();

        let reservation = limiter.try_begin(1, t0).unwrap();
        limiter.clear(1);
        drop(reservation);

        assert!(limiter.try_begin(1, t0 + Duration::days(3)).is_some());
    }

    #[test]
    fn test_clear_reopens_artifact() {
        // ---
        let limiter = RateLimiter::from_minutes(30);
        let t0 = Utc::now();

        limiter.try_begin(1, t0).unwrap().succeed(t0);
        limiter.clear(1);

        assert_eq!(limiter.last_sent_at(1), None);
        assert!(limiter.try_begin(1, t0 + Duration::minutes(1)).is_some());
    }

    #[test]
    fn test_clear_during_send_wins_over_success() {
        // ---
        let limiter = RateLimiter::from_minutes(30);
        let t0 = Utc::now();

        let reservation = limiter.try_begin(1, t0).unwrap();
        limiter.clear(1);
        reservation.succeed(t0);

        assert_eq!(limiter.last_sent_at(1), None);
        assert!(limiter.try_begin(1, t0 + Duration::minutes(1)).is_some());
    }
}
