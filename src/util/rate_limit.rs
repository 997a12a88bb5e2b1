//! Inbound rate limiting for one websocket connection
//!
//! Every frame counts against a flat frame budget, parsed messages also
//! against a budget for their kind. Decisions are budgeted off the tick rate
//! since the match only reads the newest one each tick anyway.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

use crate::ws::protocol::ClientMsg;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn limiter(per_second: u32) -> Limiter {
    RateLimiter::direct(Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN)))
}

/// Pings per second a client may send
pub const PING_RATE_LIMIT: u32 = 4;

/// Frames per second beyond the decision budget, for pings and malformed frames
pub const FRAME_HEADROOM: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Throttled {
    #[error("too many frames")]
    Frames,

    #[error("too many {0} messages")]
    Subject(&'static str),
}

/// Per-connection budgets
pub struct InboundLimiter {
    frames: Limiter,
    decisions: Limiter,
    pings: Limiter,
}

impl InboundLimiter {
    /// Room for one decision per tick
    pub fn for_tick_rate(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            frames: limiter(tick_rate.saturating_add(FRAME_HEADROOM)),
            decisions: limiter(tick_rate),
            pings: limiter(PING_RATE_LIMIT),
        }
    }

    /// Charge one raw frame, before it is parsed
    pub fn admit_frame(&self) -> Result<(), Throttled> {
        self.frames.check().map_err(|_| Throttled::Frames)
    }

    /// Charge a parsed message against its kind. Leaving is never throttled.
    pub fn admit(&self, message: &ClientMsg) -> Result<(), Throttled> {
        let budget = match message {
            ClientMsg::Decision { .. } => &self.decisions,
            ClientMsg::Ping { .. } => &self.pings,
            ClientMsg::Leave => return Ok(()),
        };
        budget.check().map_err(|_| Throttled::Subject(message.subject()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::decision::Decision;

    fn decision() -> ClientMsg {
        ClientMsg::Decision {
            tick: 0,
            decision: Decision::default(),
        }
    }

    #[test]
    fn decisions_are_budgeted_per_tick() {
        let limiter = InboundLimiter::for_tick_rate(20);
        for _ in 0..20 {
            assert_eq!(limiter.admit(&decision()), Ok(()));
        }
        assert_eq!(limiter.admit(&decision()), Err(Throttled::Subject("decision")));
        // A separate budget: pings still pass
        assert_eq!(limiter.admit(&ClientMsg::Ping { t: 1 }), Ok(()));
    }

    #[test]
    fn ping_floods_are_cut_off() {
        let limiter = InboundLimiter::for_tick_rate(20);
        let admitted = (0..10)
            .filter(|t| limiter.admit(&ClientMsg::Ping { t: *t }).is_ok())
            .count();
        assert_eq!(admitted, PING_RATE_LIMIT as usize);
    }

    #[test]
    fn leaving_always_gets_through() {
        let limiter = InboundLimiter::for_tick_rate(1);
        for _ in 0..50 {
            assert_eq!(limiter.admit(&ClientMsg::Leave), Ok(()));
        }
    }

    #[test]
    fn raw_frames_have_their_own_ceiling() {
        let limiter = InboundLimiter::for_tick_rate(5);
        let admitted = (0..40).filter(|_| limiter.admit_frame().is_ok()).count();
        assert_eq!(admitted, 5 + FRAME_HEADROOM as usize);
    }
}
