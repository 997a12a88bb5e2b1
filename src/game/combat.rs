//! Combat system - cannons, cannonballs, damage

use serde::{Deserialize, Serialize};

use crate::config::GameProperties;
use crate::util::lock::TickLock;

use super::catch_up::TickMotion;
use super::ids::EntityId;
use super::physics::{CannonMount, PhysicsSystem, Ship};
use super::wind::WindSample;
use super::Tick;

/// A mounted cannon with its reload state
#[derive(Debug, Clone, PartialEq)]
pub struct Cannon {
    pub mount: CannonMount,
    pub reload: TickLock,
}

impl Cannon {
    pub fn new(mount: CannonMount, reload_ticks: u32) -> Self {
        Self {
            mount,
            reload: TickLock::new(reload_ticks),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.reload.is_open()
    }
}

/// Active cannonball in the game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannonBall {
    pub id: EntityId,
    pub shooter_id: EntityId,
    pub x: f64,
    pub y: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    /// Tick the ball left the muzzle
    pub launch_tick: Tick,
    /// Tick the ball hits the water
    pub death_tick: Tick,
}

impl CannonBall {
    /// Launch a ball from `(x, y)` that lands on `(target_x, target_y)` in still
    /// air. Targets beyond range are pulled in to the longest possible shot.
    pub fn aimed(
        id: EntityId,
        shooter_id: EntityId,
        (x, y): (f64, f64),
        (target_x, target_y): (f64, f64),
        launch_tick: Tick,
        props: &GameProperties,
    ) -> Self {
        let dt = props.tick_seconds();
        let mut dx = target_x - x;
        let mut dy = target_y - y;
        let distance = dx.hypot(dy);
        let max_range = props.still_air_range();
        if distance > max_range {
            let scale = max_range / distance;
            dx *= scale;
            dy *= scale;
        }

        let step = props.cannon_ball.speed * dt;
        let flight_ticks = ((dx.hypot(dy) / step).round() as u64).clamp(1, props.max_flight_ticks());
        let flight_seconds = flight_ticks as f64 * dt;

        Self {
            id,
            shooter_id,
            x,
            y,
            vel_x: dx / flight_seconds,
            vel_y: dy / flight_seconds,
            launch_tick,
            death_tick: launch_tick + flight_ticks,
        }
    }

    /// Whether the ball has reached the water once the world reaches `tick`
    pub fn has_landed(&self, tick: Tick) -> bool {
        tick >= self.death_tick
    }
}

impl TickMotion for CannonBall {
    fn tick_motion(&mut self, wind: &WindSample, props: &GameProperties) {
        let dt = props.tick_seconds();
        let effect = props.cannon_ball.wind_effect;
        self.vel_x += wind.xa() * effect * dt;
        self.vel_y += wind.ya() * effect * dt;
        self.x += self.vel_x * dt;
        self.y += self.vel_y * dt;
    }
}

/// Combat system for firing and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Cannons on `ship` that are loaded and can bear on the world point
    pub fn cannons_bearing(ship: &Ship, target_x: f64, target_y: f64) -> Vec<usize> {
        Self::cannons_bearing_from(&ship.cannons, (ship.x, ship.y, ship.orientation), target_x, target_y)
    }

    /// Loaded cannons in `cannons` that could bear on the world point from
    /// the hull pose `(x, y, orientation)`
    pub fn cannons_bearing_from(
        cannons: &[Cannon],
        (x, y, orientation): (f64, f64, f64),
        target_x: f64,
        target_y: f64,
    ) -> Vec<usize> {
        cannons
            .iter()
            .enumerate()
            .filter(|(_, cannon)| cannon.is_loaded())
            .filter(|(_, cannon)| {
                let (cx, cy) = cannon.mount.world_position(x, y, orientation);
                let bearing = (target_y - cy).atan2(target_x - cx) - orientation;
                cannon.mount.can_aim_at(bearing)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: f64, damage: f64) -> (f64, bool) {
        let new_health = (current_health - damage).max(0.0);
        (new_health, new_health <= 0.0)
    }

    /// The living ship (other than the shooter) a landing ball strikes, closest first
    pub fn landing_target<'a>(
        ball: &CannonBall,
        ships: impl Iterator<Item = &'a Ship>,
    ) -> Option<EntityId> {
        ships
            .filter(|ship| ship.alive && ship.id != ball.shooter_id)
            .filter(|ship| {
                PhysicsSystem::circle_contains(ship.x, ship.y, ship.stats().hitbox_radius, ball.x, ball.y)
            })
            .map(|ship| (ship.id, PhysicsSystem::distance(ship.x, ship.y, ball.x, ball.y)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::ShipKind;

    #[test]
    fn aimed_ball_lands_on_target_in_still_air() {
        let props = GameProperties::default();
        let mut ball = CannonBall::aimed(EntityId(1), EntityId(0), (0.0, 0.0), (150.0, 0.0), 10, &props);
        assert_eq!(ball.death_tick, 20);

        for tick in ball.launch_tick..ball.death_tick {
            ball.tick_motion(&WindSample::calm(tick), &props);
        }
        assert!((ball.x - 150.0).abs() < 1e-9);
        assert!(ball.y.abs() < 1e-9);
    }

    #[test]
    fn out_of_range_targets_fall_short() {
        let props = GameProperties::default();
        let ball = CannonBall::aimed(EntityId(1), EntityId(0), (0.0, 0.0), (5000.0, 0.0), 0, &props);
        assert_eq!(ball.death_tick, props.max_flight_ticks());
        assert!((ball.vel_x - props.cannon_ball.speed).abs() < 1e-9);
    }

    #[test]
    fn wind_pushes_balls_downwind() {
        let props = GameProperties::default();
        let mut ball = CannonBall::aimed(EntityId(1), EntityId(0), (0.0, 0.0), (0.0, 300.0), 0, &props);
        let wind = WindSample {
            tick: 0,
            magnitude: 40.0,
            direction: 0.0,
        };
        for _ in 0..20 {
            ball.tick_motion(&wind, &props);
        }
        assert!(ball.x > 0.0);
    }

    #[test]
    fn only_loaded_cannons_on_the_right_side_bear() {
        let props = GameProperties::default();
        let mut ship = Ship::new(EntityId(0), ShipKind::Brig, 0.0, 0.0, 0.0, &props);

        let starboard_target = (0.0, 200.0);
        assert_eq!(CombatSystem::cannons_bearing(&ship, starboard_target.0, starboard_target.1), vec![0, 1]);
        assert_eq!(CombatSystem::cannons_bearing(&ship, 0.0, -200.0), vec![2, 3]);
        assert!(CombatSystem::cannons_bearing(&ship, 300.0, 0.0).is_empty());

        ship.cannons[0].reload.lock();
        assert_eq!(CombatSystem::cannons_bearing(&ship, starboard_target.0, starboard_target.1), vec![1]);
    }

    #[test]
    fn landing_ignores_shooter_and_wrecks() {
        let props = GameProperties::default();
        let shooter = Ship::new(EntityId(0), ShipKind::Brig, 0.0, 0.0, 0.0, &props);
        let mut wreck = Ship::new(EntityId(1), ShipKind::Brig, 5.0, 0.0, 0.0, &props);
        wreck.sink();
        let target = Ship::new(EntityId(2), ShipKind::Brig, 10.0, 0.0, 0.0, &props);

        let ball = CannonBall {
            id: EntityId(3),
            shooter_id: EntityId(0),
            x: 4.0,
            y: 0.0,
            vel_x: 0.0,
            vel_y: 0.0,
            launch_tick: 0,
            death_tick: 1,
        };
        let ships = [shooter, wreck, target];
        assert_eq!(CombatSystem::landing_target(&ball, ships.iter()), Some(EntityId(2)));
    }

    #[test]
    fn damage_floors_at_zero() {
        assert_eq!(CombatSystem::apply_damage(1.0, 3.0), (0.0, true));
        assert_eq!(CombatSystem::apply_damage(5.0, 1.0), (4.0, false));
    }
}
