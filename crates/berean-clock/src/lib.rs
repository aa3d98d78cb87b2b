//! Cancellable one-shot deadline timer for Berean room actors.
//!
//! A quiz room needs exactly one pending deadline at a time: the end of
//! the start countdown, then the close of the open question window, then
//! the end of the reveal pause, and so on. [`DeadlineTimer`] models that
//! directly — it owns at most one deadline, arming a new one *replaces*
//! the old (replaced, never stacked), and cancellation is a field write.
//!
//! # Integration
//!
//! The timer is designed to sit inside a room actor's `tokio::select!`
//! loop. While disarmed it pends forever, so the other branches keep
//! running:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         fired_at = self.deadline.fired() => {
//!             /* window closed, reveal over, ... */
//!         }
//!     }
//! }
//! ```
//!
//! A deadline that fires disarms the timer, so a fire can be observed at
//! most once per `arm`. Whether a *stale* fire still means anything is
//! decided by the state machine's phase check, not by the timer — the
//! timer only guarantees it never fires after `cancel()` and never fires
//! twice.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

/// A single owned, cancellable deadline.
///
/// One `DeadlineTimer` per concern per room actor. Not `Clone` on
/// purpose: a second handle to the same deadline is exactly the
/// armed-twice bug this type exists to prevent.
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    deadline: Option<Instant>,
}

impl DeadlineTimer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arms the timer for `deadline`, replacing any pending deadline.
    ///
    /// A deadline in the past fires on the next `fired().await`.
    pub fn arm(&mut self, deadline: Instant) {
        if self.deadline.is_some() {
            trace!("replacing pending deadline");
        }
        self.deadline = Some(deadline);
    }

    /// Arms the timer for `now + after`.
    pub fn arm_after(&mut self, after: Duration) {
        self.arm(Instant::now() + after);
    }

    /// Cancels any pending deadline. O(1), idempotent; a cancelled
    /// deadline can never fire.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The pending deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Waits for the pending deadline and returns it.
    ///
    /// Pends forever while disarmed — inside `tokio::select!` the other
    /// branches still make progress. Firing disarms the timer.
    pub async fn fired(&mut self) -> Instant {
        let Some(deadline) = self.deadline else {
            // Disarmed: never resolve on our own. select! handles the
            // other branches; a later arm() builds a fresh future.
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(deadline).await;
        self.deadline = None;
        trace!(late_by = ?Instant::now().saturating_duration_since(deadline), "deadline fired");
        deadline
    }
}
