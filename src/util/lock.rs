//! Tick-counted cooldown locks

/// A cooldown measured in whole ticks.
///
/// Cannons use it for reloading, the bot for its re-evaluation intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickLock {
    duration: u32,
    remaining: u32,
}

impl TickLock {
    /// A lock that starts open
    pub fn new(duration: u32) -> Self {
        Self {
            duration,
            remaining: 0,
        }
    }

    /// Count down one tick
    pub fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn is_open(&self) -> bool {
        self.remaining == 0
    }

    /// Close the lock for its full duration
    pub fn lock(&mut self) {
        self.remaining = self.duration;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Restore a remaining count received from elsewhere (snapshots, server state)
    pub fn set_remaining(&mut self, remaining: u32) {
        self.remaining = remaining.min(self.duration);
    }
}
