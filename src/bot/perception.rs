//! What a bot believes about the world
//!
//! Truth is sampled every tick, blurred with per-channel noise and filed under
//! the tick it was taken. Decisions read the buffer a fixed number of ticks in
//! the past, so bots react to slightly stale, slightly wrong information.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::ids::EntityId;
use crate::game::physics::{Ship, ShipKind};
use crate::game::wind::SeededRandom;
use crate::game::world::{World, WorldError};
use crate::game::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    MyX,
    MyY,
    MyVelX,
    MyVelY,
    MyOrientation,
    MyHealth,
    WindMagnitude,
    WindDirection,
    EnemyShips,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::MyX,
        Channel::MyY,
        Channel::MyVelX,
        Channel::MyVelY,
        Channel::MyOrientation,
        Channel::MyHealth,
        Channel::WindMagnitude,
        Channel::WindDirection,
        Channel::EnemyShips,
    ];
}

/// An enemy as the bot sees it
#[derive(Debug, Clone, PartialEq)]
pub struct PerceivedShip {
    pub id: EntityId,
    pub kind: ShipKind,
    pub x: f64,
    pub y: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    pub orientation: f64,
    pub health: f64,
}

impl PerceivedShip {
    /// Position after `seconds` at constant velocity
    pub fn predicted_position(&self, seconds: f64) -> (f64, f64) {
        (self.x + self.vel_x * seconds, self.y + self.vel_y * seconds)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Scalar(f64),
    Ships(Vec<PerceivedShip>),
}

/// Noise spread per channel; each reading is offset by a uniform draw in `[-spread, spread]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseProfile {
    pub position: f64,
    pub velocity: f64,
    pub orientation: f64,
    pub wind_magnitude: f64,
    pub wind_direction: f64,
}

impl Default for NoiseProfile {
    fn default() -> Self {
        Self {
            position: 4.0,
            velocity: 2.0,
            orientation: 0.02,
            wind_magnitude: 1.0,
            wind_direction: 0.03,
        }
    }
}

impl NoiseProfile {
    /// No noise at all
    pub fn exact() -> Self {
        Self {
            position: 0.0,
            velocity: 0.0,
            orientation: 0.0,
            wind_magnitude: 0.0,
            wind_direction: 0.0,
        }
    }
}

/// Tick-keyed readings per channel
#[derive(Debug, Clone, Default)]
pub struct PerceptionBuffer {
    channels: BTreeMap<Channel, BTreeMap<Tick, Reading>>,
}

impl PerceptionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, channel: Channel, tick: Tick, reading: Reading) {
        self.channels.entry(channel).or_default().insert(tick, reading);
    }

    /// Latest reading taken at or before `tick`
    pub fn read(&self, channel: Channel, tick: Tick) -> Option<&Reading> {
        self.channels
            .get(&channel)?
            .range(..=tick)
            .next_back()
            .map(|(_, reading)| reading)
    }

    pub fn scalar(&self, channel: Channel, tick: Tick) -> Option<f64> {
        match self.read(channel, tick)? {
            Reading::Scalar(value) => Some(*value),
            Reading::Ships(_) => None,
        }
    }

    pub fn ships(&self, tick: Tick) -> Option<&[PerceivedShip]> {
        match self.read(Channel::EnemyShips, tick)? {
            Reading::Ships(ships) => Some(ships),
            Reading::Scalar(_) => None,
        }
    }

    /// Whether every channel has a reading at or before `tick`
    pub fn has_data_by(&self, tick: Tick) -> bool {
        Channel::ALL.iter().all(|channel| self.read(*channel, tick).is_some())
    }

    /// Drop readings older than `tick`, keeping the latest one before it per channel
    pub fn prune_before(&mut self, tick: Tick) {
        for readings in self.channels.values_mut() {
            let keep_from = readings.range(..=tick).next_back().map(|(t, _)| *t).unwrap_or(tick);
            *readings = readings.split_off(&keep_from);
        }
    }
}

/// One assembled view of the world at a past tick
#[derive(Debug, Clone, PartialEq)]
pub struct PerceivedWorld {
    pub tick: Tick,
    pub me: PerceivedShip,
    pub wind_magnitude: f64,
    pub wind_direction: f64,
    pub enemies: Vec<PerceivedShip>,
}

impl PerceivedWorld {
    pub fn enemy(&self, id: EntityId) -> Option<&PerceivedShip> {
        self.enemies.iter().find(|enemy| enemy.id == id)
    }
}

/// Samples truth into a [`PerceptionBuffer`] and reads it back with a delay
#[derive(Debug, Clone)]
pub struct Perception {
    buffer: PerceptionBuffer,
    delay_ticks: Tick,
    noise: NoiseProfile,
    random: SeededRandom,
}

impl Perception {
    pub fn new(seed: u64, delay_ticks: Tick, noise: NoiseProfile) -> Self {
        Self {
            buffer: PerceptionBuffer::new(),
            delay_ticks,
            noise,
            random: SeededRandom::new(seed),
        }
    }

    pub fn buffer(&self) -> &PerceptionBuffer {
        &self.buffer
    }

    pub fn delay_ticks(&self) -> Tick {
        self.delay_ticks
    }

    /// File a noisy copy of the current world under the world's tick
    pub fn observe(&mut self, world: &World, own: EntityId) -> Result<(), WorldError> {
        let tick = world.tick();
        let me = world.ship(own)?;
        let noise = self.noise;

        let readings = [
            (Channel::MyX, me.x + self.random.symmetric(noise.position)),
            (Channel::MyY, me.y + self.random.symmetric(noise.position)),
            (Channel::MyVelX, me.vel_x + self.random.symmetric(noise.velocity)),
            (Channel::MyVelY, me.vel_y + self.random.symmetric(noise.velocity)),
            (Channel::MyOrientation, me.orientation + self.random.symmetric(noise.orientation)),
            (Channel::MyHealth, me.health),
            (
                Channel::WindMagnitude,
                (world.wind().magnitude() + self.random.symmetric(noise.wind_magnitude)).max(0.0),
            ),
            (Channel::WindDirection, world.wind().direction() + self.random.symmetric(noise.wind_direction)),
        ];
        for (channel, value) in readings {
            self.buffer.record(channel, tick, Reading::Scalar(value));
        }

        let enemies = world
            .ships()
            .filter(|ship| ship.alive && ship.id != own)
            .map(|ship| self.blur(ship))
            .collect();
        self.buffer.record(Channel::EnemyShips, tick, Reading::Ships(enemies));

        self.buffer.prune_before(tick.saturating_sub(self.delay_ticks));
        Ok(())
    }

    fn blur(&mut self, ship: &Ship) -> PerceivedShip {
        PerceivedShip {
            id: ship.id,
            kind: ship.kind,
            x: ship.x + self.random.symmetric(self.noise.position),
            y: ship.y + self.random.symmetric(self.noise.position),
            vel_x: ship.vel_x + self.random.symmetric(self.noise.velocity),
            vel_y: ship.vel_y + self.random.symmetric(self.noise.velocity),
            orientation: ship.orientation + self.random.symmetric(self.noise.orientation),
            health: ship.health,
        }
    }

    /// The delayed view for decisions made at `now`, if the buffer reaches back that far
    pub fn view(&self, now: Tick, own: EntityId, own_kind: ShipKind) -> Option<PerceivedWorld> {
        let tick = now.checked_sub(self.delay_ticks)?;
        if !self.buffer.has_data_by(tick) {
            return None;
        }
        let scalar = |channel| self.buffer.scalar(channel, tick);
        Some(PerceivedWorld {
            tick,
            me: PerceivedShip {
                id: own,
                kind: own_kind,
                x: scalar(Channel::MyX)?,
                y: scalar(Channel::MyY)?,
                vel_x: scalar(Channel::MyVelX)?,
                vel_y: scalar(Channel::MyVelY)?,
                orientation: scalar(Channel::MyOrientation)?,
                health: scalar(Channel::MyHealth)?,
            },
            wind_magnitude: scalar(Channel::WindMagnitude)?,
            wind_direction: scalar(Channel::WindDirection)?,
            enemies: self.buffer.ships(tick)?.to_vec(),
        })
    }
}
