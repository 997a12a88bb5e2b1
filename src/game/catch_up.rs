//! Tick reconciliation
//!
//! A server event stamped with the tick it happened at is usually seen by the
//! receiver a few ticks later. Catch-up replays the missing ticks for the
//! entity the event created or corrected, using the wind that was actually
//! recorded at each of those ticks, so the entity lands exactly where live
//! simulation would have put it.

use crate::config::GameProperties;

use super::wind::{WindHistory, WindSample};
use super::Tick;

/// One tick of motion. Live simulation, catch-up and replay playback all go
/// through this, so they cannot drift apart.
pub trait TickMotion {
    fn tick_motion(&mut self, wind: &WindSample, props: &GameProperties);
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("event from tick {origin} is in the future of local tick {target}")]
    FutureEvent { origin: Tick, target: Tick },

    #[error("no wind sample recorded for tick {tick}; event is older than the retained history")]
    WindSampleMissing { tick: Tick },
}

/// Advance `entity` from `origin` to `target`, one recorded wind sample per tick
pub fn catch_up<E: TickMotion + ?Sized>(
    entity: &mut E,
    origin: Tick,
    target: Tick,
    history: &WindHistory,
    props: &GameProperties,
) -> Result<(), ReconcileError> {
    if target == origin {
        return Ok(());
    }
    if target < origin {
        return Err(ReconcileError::FutureEvent { origin, target });
    }

    // Validate the whole window first so a failure never leaves a half-replayed entity.
    let samples = (origin..target)
        .map(|tick| history.get(tick).ok_or(ReconcileError::WindSampleMissing { tick }))
        .collect::<Result<Vec<_>, _>>()?;

    for sample in samples {
        entity.tick_motion(sample, props);
    }
    Ok(())
}
