//! Persisted replays
//!
//! A replay is the opening state plus, for every tick on which something
//! changed, the ships that joined and the decisions that differ from the
//! ship's previous one. Playback feeds them through the same `World::step`
//! used live, then compares the final checksum.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GameProperties;

use super::decision::Decision;
use super::ids::EntityId;
use super::snapshot::{ShipState, WorldSnapshot};
use super::world::{Authority, World, WorldError};
use super::Tick;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("replay file: {0}")]
    Io(#[from] std::io::Error),

    #[error("replay format: {0}")]
    Format(#[from] serde_json::Error),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error("replay is not finished")]
    Unfinished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub tick: Tick,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spawns: Vec<ShipState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deltas: Vec<(EntityId, Decision)>,
    /// Ships scuttled because their captain left
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub departures: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    pub recorded_at: DateTime<Utc>,
    pub seed: u64,
    /// Tick the opening state was taken at
    pub start_tick: Tick,
    pub opening: Vec<ShipState>,
    pub frames: Vec<ReplayFrame>,
    pub final_tick: Option<Tick>,
    pub final_checksum: Option<String>,
}

impl Replay {
    pub fn save(&self, path: &Path) -> Result<(), ReplayError> {
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Re-run the recorded match and return the resulting world
    pub fn play(&self, props: Arc<GameProperties>) -> Result<World, ReplayError> {
        let final_tick = self.final_tick.ok_or(ReplayError::Unfinished)?;
        let mut world = World::starting_at(props.clone(), self.seed, Authority::Server, self.start_tick);
        for state in &self.opening {
            world.insert_ship(state.to_ship(&props))?;
        }

        let mut frames = self.frames.iter().peekable();
        while world.tick() < final_tick {
            while let Some(frame) = frames.next_if(|frame| frame.tick <= world.tick()) {
                for state in &frame.spawns {
                    world.insert_ship(state.to_ship(&props))?;
                }
                for (ship_id, decision) in &frame.deltas {
                    world.apply_decision(*ship_id, decision)?;
                }
                for ship_id in &frame.departures {
                    world.sink_ship(*ship_id)?;
                }
            }
            world.step()?;
        }
        Ok(world)
    }

    /// Play back and compare against the recorded checksum
    pub fn verify(&self, props: Arc<GameProperties>) -> Result<bool, ReplayError> {
        let world = self.play(props)?;
        let checksum = WorldSnapshot::capture(&world).checksum();
        let matches = self.final_checksum.as_deref() == Some(checksum.as_str());
        if !matches {
            warn!(seed = self.seed, final_tick = ?self.final_tick, "Replay diverged from recording");
        }
        Ok(matches)
    }
}

/// Builds a [`Replay`] alongside a live world
#[derive(Debug, Clone)]
pub struct ReplayRecorder {
    replay: Replay,
    last_decisions: HashMap<EntityId, Decision>,
}

impl ReplayRecorder {
    /// Start recording from the world's current ships. Cannonballs already in
    /// flight are not captured, so start before anyone fires.
    pub fn new(world: &World) -> Self {
        Self {
            replay: Replay {
                recorded_at: Utc::now(),
                seed: world.seed(),
                start_tick: world.tick(),
                opening: world.ships().map(ShipState::from_ship).collect(),
                frames: Vec::new(),
                final_tick: None,
                final_checksum: None,
            },
            last_decisions: world.ships().map(|ship| (ship.id, ship.decision())).collect(),
        }
    }

    fn frame(&mut self, tick: Tick) -> &mut ReplayFrame {
        let needs_frame = self.replay.frames.last().map_or(true, |frame| frame.tick != tick);
        if needs_frame {
            self.replay.frames.push(ReplayFrame {
                tick,
                spawns: Vec::new(),
                deltas: Vec::new(),
                departures: Vec::new(),
            });
        }
        let last = self.replay.frames.len() - 1;
        &mut self.replay.frames[last]
    }

    pub fn record_spawn(&mut self, tick: Tick, state: ShipState) {
        self.last_decisions.insert(state.id, state.decision());
        self.frame(tick).spawns.push(state);
    }

    /// Record a decision applied before stepping `tick`; unchanged decisions are skipped
    pub fn record_decision(&mut self, tick: Tick, ship_id: EntityId, decision: Decision) {
        if self.last_decisions.get(&ship_id) == Some(&decision) {
            return;
        }
        self.last_decisions.insert(ship_id, decision);
        self.frame(tick).deltas.push((ship_id, decision));
    }

    pub fn record_departure(&mut self, tick: Tick, ship_id: EntityId) {
        self.frame(tick).departures.push(ship_id);
    }

    pub fn finish(mut self, world: &World) -> Replay {
        self.replay.final_tick = Some(world.tick());
        self.replay.final_checksum = Some(WorldSnapshot::capture(world).checksum());
        info!(
            seed = self.replay.seed,
            ticks = world.tick(),
            frames = self.replay.frames.len(),
            "Replay recorded"
        );
        self.replay
    }
}
