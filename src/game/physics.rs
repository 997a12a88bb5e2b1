//! Ship physics, hull stats and cannon geometry
//!
//! Angles are radians measured clockwise in screen space (y grows downward),
//! so a ship's starboard side sits at `orientation + π/2`.

use std::f64::consts::{FRAC_PI_4, TAU};

use serde::{Deserialize, Serialize};

use crate::config::GameProperties;

use super::catch_up::TickMotion;
use super::combat::Cannon;
use super::decision::{Aim, Decision, TurnDirection};
use super::ids::EntityId;
use super::wind::WindSample;

/// Hull models available in the game
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipKind {
    /// Quick and light, two guns
    Sloop,
    /// Balanced
    #[default]
    Brig,
    /// Heavy broadside, slow to turn
    Frigate,
}

/// Ship physics constants per hull
#[derive(Debug, Clone, Copy)]
pub struct ShipStats {
    /// Own propulsion at full sail (px/s²)
    pub propulsion: f64,
    /// Fraction of the wind acceleration caught at full sail
    pub wind_catch: f64,
    /// Velocity retained each tick
    pub drag: f64,
    /// Maximum speed (px/s)
    pub max_speed: f64,
    /// Turn rate in radians per second
    pub turn_rate: f64,
    pub max_health: f64,
    /// Ship hitbox radius
    pub hitbox_radius: f64,
}

impl ShipStats {
    pub fn for_kind(kind: ShipKind) -> Self {
        match kind {
            ShipKind::Sloop => Self {
                propulsion: 60.0,
                wind_catch: 0.8,
                drag: 0.97,
                max_speed: 140.0,
                turn_rate: 1.2,
                max_health: 3.0,
                hitbox_radius: 18.0,
            },
            ShipKind::Brig => Self {
                propulsion: 45.0,
                wind_catch: 1.0,
                drag: 0.97,
                max_speed: 120.0,
                turn_rate: 0.9,
                max_health: 5.0,
                hitbox_radius: 24.0,
            },
            ShipKind::Frigate => Self {
                propulsion: 35.0,
                wind_catch: 1.1,
                drag: 0.975,
                max_speed: 110.0,
                turn_rate: 0.7,
                max_health: 8.0,
                hitbox_radius: 30.0,
            },
        }
    }
}

/// Where a cannon sits on the hull and which way it can swing.
///
/// `offset_x` points toward the bow, `offset_y` toward starboard. The arc runs
/// clockwise from `arc_start` to `arc_end`, relative to the ship's heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannonMount {
    pub offset_x: f64,
    pub offset_y: f64,
    pub arc_start: f64,
    pub arc_end: f64,
}

const STARBOARD_ARC: (f64, f64) = (FRAC_PI_4, 3.0 * FRAC_PI_4);
const PORT_ARC: (f64, f64) = (5.0 * FRAC_PI_4, 7.0 * FRAC_PI_4);

const fn mount(offset_x: f64, offset_y: f64, arc: (f64, f64)) -> CannonMount {
    CannonMount {
        offset_x,
        offset_y,
        arc_start: arc.0,
        arc_end: arc.1,
    }
}

const SLOOP_MOUNTS: [CannonMount; 2] = [mount(0.0, 8.0, STARBOARD_ARC), mount(0.0, -8.0, PORT_ARC)];

const BRIG_MOUNTS: [CannonMount; 4] = [
    mount(10.0, 10.0, STARBOARD_ARC),
    mount(-10.0, 10.0, STARBOARD_ARC),
    mount(10.0, -10.0, PORT_ARC),
    mount(-10.0, -10.0, PORT_ARC),
];

const FRIGATE_MOUNTS: [CannonMount; 6] = [
    mount(14.0, 13.0, STARBOARD_ARC),
    mount(0.0, 13.0, STARBOARD_ARC),
    mount(-14.0, 13.0, STARBOARD_ARC),
    mount(14.0, -13.0, PORT_ARC),
    mount(0.0, -13.0, PORT_ARC),
    mount(-14.0, -13.0, PORT_ARC),
];

impl ShipKind {
    pub fn stats(self) -> ShipStats {
        ShipStats::for_kind(self)
    }

    pub fn cannon_mounts(self) -> &'static [CannonMount] {
        match self {
            Self::Sloop => &SLOOP_MOUNTS,
            Self::Brig => &BRIG_MOUNTS,
            Self::Frigate => &FRIGATE_MOUNTS,
        }
    }
}

impl CannonMount {
    /// Whether a bearing relative to the bow lies inside the clockwise arc
    pub fn can_aim_at(&self, relative_angle: f64) -> bool {
        let span = (self.arc_end - self.arc_start).rem_euclid(TAU);
        let offset = (relative_angle - self.arc_start).rem_euclid(TAU);
        offset <= span
    }

    /// World position of this mount on a ship at `(x, y)` facing `orientation`
    pub fn world_position(&self, x: f64, y: f64, orientation: f64) -> (f64, f64) {
        let (ox, oy) = PhysicsSystem::rotate(self.offset_x, self.offset_y, orientation);
        (x + ox, y + oy)
    }
}

/// Physics helpers shared by the live simulation, catch-up and the bot
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Hull acceleration for a sail setting: own propulsion along the heading
    /// plus the share of wind the sails catch.
    ///
    /// Propulsion grows with `sail^exponent` and wind linearly, so for a fixed
    /// heading the progress along any direction is concave (unimodal) in sail.
    pub fn acceleration(
        stats: &ShipStats,
        sail_strength: f64,
        orientation: f64,
        wind_xa: f64,
        wind_ya: f64,
        sail_exponent: f64,
    ) -> (f64, f64) {
        let sail = sail_strength.clamp(0.0, 1.0);
        let thrust = stats.propulsion * sail.powf(sail_exponent);
        let catch = stats.wind_catch * sail;
        (
            orientation.cos() * thrust + wind_xa * catch,
            orientation.sin() * thrust + wind_ya * catch,
        )
    }

    /// Rotate a hull-local offset into world space
    pub fn rotate(x: f64, y: f64, angle: f64) -> (f64, f64) {
        let (sin, cos) = angle.sin_cos();
        (x * cos - y * sin, x * sin + y * cos)
    }

    /// Signed shortest rotation from `from` to `to`, in `(-π, π]`
    pub fn angle_difference(from: f64, to: f64) -> f64 {
        let diff = (to - from).rem_euclid(TAU);
        if diff > std::f64::consts::PI {
            diff - TAU
        } else {
            diff
        }
    }

    /// Check if a point lies within a circle
    pub fn circle_contains(cx: f64, cy: f64, radius: f64, x: f64, y: f64) -> bool {
        let dx = x - cx;
        let dy = y - cy;
        dx * dx + dy * dy <= radius * radius
    }

    pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
        (x2 - x1).hypot(y2 - y1)
    }
}

/// A ship in the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct Ship {
    pub id: EntityId,
    pub kind: ShipKind,

    // Position and movement
    pub x: f64,
    pub y: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    pub orientation: f64,

    // Standing orders
    pub sail_strength: f64,
    pub turn: TurnDirection,
    pub aim: Aim,
    pub fire_cannons: bool,

    // Combat
    pub cannons: Vec<Cannon>,
    pub health: f64,
    pub alive: bool,
}

impl Ship {
    pub fn new(
        id: EntityId,
        kind: ShipKind,
        x: f64,
        y: f64,
        orientation: f64,
        props: &GameProperties,
    ) -> Self {
        let reload_ticks = props.reload_ticks();
        Self {
            id,
            kind,
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            orientation: orientation.rem_euclid(TAU),
            sail_strength: 0.0,
            turn: TurnDirection::Hold,
            aim: Aim::NotAiming,
            fire_cannons: false,
            cannons: kind
                .cannon_mounts()
                .iter()
                .map(|mount| Cannon::new(*mount, reload_ticks))
                .collect(),
            health: kind.stats().max_health,
            alive: true,
        }
    }

    pub fn stats(&self) -> ShipStats {
        self.kind.stats()
    }

    pub fn apply_decision(&mut self, decision: &Decision) {
        self.turn = decision.turn;
        self.sail_strength = decision.sail_strength.clamp(0.0, 1.0);
        self.aim = decision.aim;
        self.fire_cannons = decision.fire_cannons;
    }

    /// The standing orders as a decision record
    pub fn decision(&self) -> Decision {
        Decision {
            turn: self.turn,
            sail_strength: self.sail_strength,
            aim: self.aim,
            fire_cannons: self.fire_cannons,
        }
    }

    /// World position of cannon `index`
    pub fn cannon_position(&self, index: usize) -> Option<(f64, f64)> {
        self.cannons
            .get(index)
            .map(|cannon| cannon.mount.world_position(self.x, self.y, self.orientation))
    }

    pub fn tick_reloads(&mut self) {
        for cannon in &mut self.cannons {
            cannon.reload.tick();
        }
    }

    /// Mark the ship sunk; it stops moving and firing
    pub fn sink(&mut self) {
        self.alive = false;
        self.health = 0.0;
        self.vel_x = 0.0;
        self.vel_y = 0.0;
        self.fire_cannons = false;
    }
}

impl TickMotion for Ship {
    fn tick_motion(&mut self, wind: &WindSample, props: &GameProperties) {
        if !self.alive {
            return;
        }
        let stats = self.stats();
        let dt = props.tick_seconds();

        self.orientation = (self.orientation + self.turn.sign() * stats.turn_rate * dt).rem_euclid(TAU);

        let (ax, ay) = PhysicsSystem::acceleration(
            &stats,
            self.sail_strength,
            self.orientation,
            wind.xa(),
            wind.ya(),
            props.sail_strength_exponent,
        );

        self.vel_x = (self.vel_x + ax * dt) * stats.drag;
        self.vel_y = (self.vel_y + ay * dt) * stats.drag;

        // Clamp to max speed
        let speed = self.vel_x.hypot(self.vel_y);
        if speed > stats.max_speed {
            let scale = stats.max_speed / speed;
            self.vel_x *= scale;
            self.vel_y *= scale;
        }

        self.x += self.vel_x * dt;
        self.y += self.vel_y * dt;
    }
}
