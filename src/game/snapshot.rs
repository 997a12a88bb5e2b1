//! Ship state for the wire, full-world snapshots and state checksums

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::GameProperties;

use super::combat::CannonBall;
use super::decision::{Aim, Decision, TurnDirection};
use super::ids::EntityId;
use super::physics::{Ship, ShipKind};
use super::world::World;
use super::Tick;

/// Everything needed to rebuild a ship on the other side of the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipState {
    pub id: EntityId,
    pub kind: ShipKind,
    pub x: f64,
    pub y: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    pub orientation: f64,
    pub sail_strength: f64,
    pub turn: TurnDirection,
    pub aim: Aim,
    pub fire_cannons: bool,
    pub health: f64,
    pub alive: bool,
    /// Remaining reload ticks per cannon, in mount order
    pub reloads: Vec<u32>,
}

impl ShipState {
    pub fn from_ship(ship: &Ship) -> Self {
        Self {
            id: ship.id,
            kind: ship.kind,
            x: ship.x,
            y: ship.y,
            vel_x: ship.vel_x,
            vel_y: ship.vel_y,
            orientation: ship.orientation,
            sail_strength: ship.sail_strength,
            turn: ship.turn,
            aim: ship.aim,
            fire_cannons: ship.fire_cannons,
            health: ship.health,
            alive: ship.alive,
            reloads: ship.cannons.iter().map(|cannon| cannon.reload.remaining()).collect(),
        }
    }

    /// The standing orders carried in this state
    pub fn decision(&self) -> Decision {
        Decision {
            turn: self.turn,
            sail_strength: self.sail_strength,
            aim: self.aim,
            fire_cannons: self.fire_cannons,
        }
    }

    pub fn to_ship(&self, props: &GameProperties) -> Ship {
        let mut ship = Ship::new(self.id, self.kind, self.x, self.y, self.orientation, props);
        ship.vel_x = self.vel_x;
        ship.vel_y = self.vel_y;
        ship.sail_strength = self.sail_strength;
        ship.turn = self.turn;
        ship.aim = self.aim;
        ship.fire_cannons = self.fire_cannons;
        ship.health = self.health;
        ship.alive = self.alive;
        for (cannon, remaining) in ship.cannons.iter_mut().zip(&self.reloads) {
            cannon.reload.set_remaining(*remaining);
        }
        ship
    }
}

/// A full picture of one world at one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub seed: u64,
    pub wind_magnitude: f64,
    pub wind_direction: f64,
    pub ships: Vec<ShipState>,
    pub cannon_balls: Vec<CannonBall>,
}

impl WorldSnapshot {
    pub fn capture(world: &World) -> Self {
        Self {
            tick: world.tick(),
            seed: world.seed(),
            wind_magnitude: world.wind().magnitude(),
            wind_direction: world.wind().direction(),
            ships: world.ships().map(ShipState::from_ship).collect(),
            cannon_balls: world.cannon_balls().cloned().collect(),
        }
    }

    /// Hex SHA-256 over the JSON encoding; equal worlds give equal checksums
    pub fn checksum(&self) -> String {
        // Plain data with string keys, serialization cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// Decides when the server sends periodic position updates
pub struct SnapshotBuilder {
    ticks_since_update: u32,
    update_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(update_interval: u32) -> Self {
        Self {
            ticks_since_update: 0,
            update_interval: update_interval.max(1),
        }
    }

    /// Check if it's time to send an update
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_update += 1;
        if self.ticks_since_update >= self.update_interval {
            self.ticks_since_update = 0;
            true
        } else {
            false
        }
    }

    /// Force an update on next check (after sinkings and joins)
    pub fn force_next(&mut self) {
        self.ticks_since_update = self.update_interval;
    }

    /// Current state of every ship still afloat
    pub fn ship_states(world: &World) -> Vec<ShipState> {
        world.ships().filter(|ship| ship.alive).map(ShipState::from_ship).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::game::world::Authority;

    #[test]
    fn ship_state_round_trips_through_json() {
        let props = GameProperties::default();
        let mut ship = Ship::new(EntityId(3), ShipKind::Frigate, 12.5, -40.25, 1.1, &props);
        ship.vel_x = 0.1 + 0.2;
        ship.aim = Aim::Aiming { x: 30.0, y: -7.5 };
        ship.cannons[2].reload.lock();

        let state = ShipState::from_ship(&ship);
        let json = serde_json::to_string(&state).expect("serialize");
        let decoded: ShipState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded.to_ship(&props), ship);
    }

    #[test]
    fn update_interval_is_honoured() {
        let mut builder = SnapshotBuilder::new(3);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);
        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn checksum_tracks_world_state() {
        let props = Arc::new(GameProperties::default());
        let mut a = World::new(props.clone(), 9, Authority::Server);
        let mut b = World::new(props, 9, Authority::Server);
        a.spawn_ship(ShipKind::Sloop, 0.0, 0.0, 0.0);
        b.spawn_ship(ShipKind::Sloop, 0.0, 0.0, 0.0);
        assert_eq!(WorldSnapshot::capture(&a).checksum(), WorldSnapshot::capture(&b).checksum());

        a.step().expect("step");
        assert_ne!(WorldSnapshot::capture(&a).checksum(), WorldSnapshot::capture(&b).checksum());
    }
}
