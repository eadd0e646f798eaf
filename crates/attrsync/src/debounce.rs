//! Leading-edge debouncing for host notifications.

use std::time::Duration;

use tokio::time::Instant;

/// Leading-edge debouncer with a resetting window.
///
/// The first call of a burst fires immediately. Calls arriving less than
/// `window` after the previous call are swallowed and extend the burst.
#[derive(Debug, Clone)]
pub struct Debouncer {
    /// Quiet period that ends a burst.
    window: Duration,
    /// Time of the most recent call.
    last_call: Option<Instant>,
    /// Calls that fired.
    fired: u64,
    /// Calls swallowed.
    swallowed: u64,
}

impl Debouncer {
    /// Create a debouncer with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_call: None,
            fired: 0,
            swallowed: 0,
        }
    }

    /// Record a call at the current time.
    pub fn call(&mut self) -> bool {
        self.call_at(Instant::now())
    }

    /// Record a call at `now`; returns true when the action should run.
    pub fn call_at(&mut self, now: Instant) -> bool {
        let in_burst = self
            .last_call
            .is_some_and(|last| now.saturating_duration_since(last) < self.window);
        self.last_call = Some(now);
        if in_burst {
            self.swallowed += 1;
            false
        } else {
            self.fired += 1;
            true
        }
    }

    /// Forget the current burst.
    pub fn reset(&mut self) {
        self.last_call = None;
    }

    /// The configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Calls that fired.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Calls swallowed inside a burst.
    pub fn swallowed(&self) -> u64 {
        self.swallowed
    }
}
