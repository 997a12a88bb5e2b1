//! Deterministic tick scheduler
//!
//! Converts elapsed wall time into a count of owed simulation ticks. Paused
//! time and deliberately destroyed ticks are tracked as "time debt", an offset
//! subtracted from elapsed time before dividing by the tick gap.

use super::Tick;

/// What a frame should do after asking the scheduler how many ticks are owed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePlan {
    /// Nothing owed (or paused)
    Idle,
    /// Simulate exactly one tick, then call [`TickScheduler::count_tick`]
    Simulate,
    /// Owed ticks exceed the tolerated delay; the session must end
    Desync { owed: u64 },
}

#[derive(Debug, Clone)]
pub struct TickScheduler {
    start_time: f64,
    tick_rate: u32,
    tick_gap_ms: f64,
    time_debt: f64,
    latest_time_debt: f64,
    paused: bool,
    pause_start_time: f64,
    tick_count: Tick,
    last_tick_time: f64,
}

impl TickScheduler {
    pub fn new(tick_rate: u32, start_time: f64) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            start_time,
            tick_rate,
            tick_gap_ms: 1000.0 / tick_rate as f64,
            time_debt: 0.0,
            latest_time_debt: 0.0,
            paused: false,
            pause_start_time: 0.0,
            tick_count: 0,
            last_tick_time: start_time,
        }
    }

    /// Ticks that should have elapsed by `now`, never negative
    pub fn expected_ticks(&self, now: f64) -> Tick {
        let elapsed = now - (self.start_time + self.time_debt);
        (elapsed / self.tick_gap_ms).floor().max(0.0) as Tick
    }

    /// Ticks owed at `now`. Always zero while paused.
    pub fn advance(&self, now: f64) -> u64 {
        if self.paused {
            return 0;
        }
        self.expected_ticks(now).saturating_sub(self.tick_count)
    }

    /// Record that one tick was simulated at `now`
    pub fn count_tick(&mut self, now: f64) {
        self.tick_count += 1;
        self.last_tick_time = now;
    }

    pub fn pause(&mut self, now: f64) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.pause_start_time = now;
    }

    /// Resume; the paused interval is forgiven as time debt
    pub fn unpause(&mut self, now: f64) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.add_time_debt((now - self.pause_start_time).max(0.0));
    }

    /// Shift the schedule back by `ms`, forgiving lag or destroying surplus ticks
    pub fn add_time_debt(&mut self, ms: f64) {
        self.time_debt += ms;
        self.latest_time_debt = ms;
    }

    /// Decide what this frame does. At most one tick is simulated per frame;
    /// any surplus is converted into debt rather than burst-simulated.
    pub fn plan_frame(&mut self, now: f64, max_owed: u64) -> FramePlan {
        let owed = self.advance(now);
        if owed > max_owed {
            return FramePlan::Desync { owed };
        }
        if owed == 0 {
            return FramePlan::Idle;
        }
        if owed > 1 {
            self.add_time_debt((owed - 1) as f64 * self.tick_gap_ms);
        }
        FramePlan::Simulate
    }

    pub fn tick_count(&self) -> Tick {
        self.tick_count
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn tick_gap_ms(&self) -> f64 {
        self.tick_gap_ms
    }

    pub fn time_debt(&self) -> f64 {
        self.time_debt
    }

    pub fn latest_time_debt(&self) -> f64 {
        self.latest_time_debt
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn last_tick_time(&self) -> f64 {
        self.last_tick_time
    }
}
