//! Boolean-with-timeout debounce flags.

use muster_core::TickId;

/// A flag that reads as set for a fixed number of ticks after it was set.
///
/// The interval is supplied at read time so a configuration change takes
/// effect on flags already running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimedFlag {
    set_at: Option<TickId>,
}

impl TimedFlag {
    /// A flag that has never been set.
    pub const fn new() -> Self {
        Self { set_at: None }
    }

    /// Set the flag at `now`, restarting its timeout.
    pub fn set(&mut self, now: TickId) {
        self.set_at = Some(now);
    }

    /// Clear the flag immediately.
    pub fn clear(&mut self) {
        self.set_at = None;
    }

    /// Whether the flag reads as set at `now`: `now - set_at < interval`.
    pub fn is_set(&self, now: TickId, interval: u64) -> bool {
        match self.set_at {
            Some(t) => now.since(t) < interval,
            None => false,
        }
    }

    /// Tick at which the flag was last set.
    pub fn set_at(&self) -> Option<TickId> {
        self.set_at
    }
}
