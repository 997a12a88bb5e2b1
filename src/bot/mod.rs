//! Bot captains: perception, helm and fire control

pub mod arena;
pub mod fire_control;
pub mod helm;
pub mod perception;
pub mod search;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::game::decision::{Decision, TurnDirection};
use crate::game::ids::EntityId;
use crate::game::physics::PhysicsSystem;
use crate::game::world::{World, WorldError};
use crate::game::Tick;
use crate::util::lock::TickLock;

use fire_control::{plan_fire, Ballistics};
use perception::{NoiseProfile, Perception, PerceivedShip, PerceivedWorld};

/// Tuning for one bot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// How stale the bot's information is
    pub perception_delay_ticks: Tick,
    pub noise: NoiseProfile,
    /// Ticks between target re-evaluations
    pub target_lock_ticks: u32,
    /// Ticks between heading re-evaluations
    pub heading_lock_ticks: u32,
    /// Ticks between sail re-evaluations
    pub sail_lock_ticks: u32,
    /// How far upwind of the target the bot tries to sit
    pub upwind_distance: f64,
    /// How far ahead the target's position is predicted when steering
    pub heading_lead_seconds: f64,
    /// Heading error tolerated before turning (radians)
    pub heading_deadband: f64,
    /// Share of the target hitbox a predicted landing must fall within
    pub acceptable_miss_fraction: f64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            perception_delay_ticks: 2,
            noise: NoiseProfile::default(),
            target_lock_ticks: 20,
            heading_lock_ticks: 10,
            sail_lock_ticks: 5,
            upwind_distance: 120.0,
            heading_lead_seconds: 2.0,
            heading_deadband: 0.05,
            acceptable_miss_fraction: 0.5,
        }
    }
}

/// Seed for one bot's noise stream, derived from the match seed
pub fn bot_seed(match_seed: u64, ship: EntityId) -> u64 {
    match_seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ u64::from(ship.0).wrapping_add(1)
}

/// Drives one ship
#[derive(Debug, Clone)]
pub struct BotController {
    ship_id: EntityId,
    config: BotConfig,
    perception: Perception,
    target_lock: TickLock,
    heading_lock: TickLock,
    sail_lock: TickLock,
    target: Option<EntityId>,
    desired_heading: Option<f64>,
    sail_strength: f64,
}

impl BotController {
    pub fn new(ship_id: EntityId, match_seed: u64, config: BotConfig) -> Self {
        Self {
            ship_id,
            perception: Perception::new(
                bot_seed(match_seed, ship_id),
                config.perception_delay_ticks,
                config.noise,
            ),
            target_lock: TickLock::new(config.target_lock_ticks),
            heading_lock: TickLock::new(config.heading_lock_ticks),
            sail_lock: TickLock::new(config.sail_lock_ticks),
            config,
            target: None,
            desired_heading: None,
            sail_strength: 0.0,
        }
    }

    pub fn ship_id(&self) -> EntityId {
        self.ship_id
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    /// Run one controller tick against `world`. `None` while the bot has not
    /// perceived enough history to act, or once its ship has sunk.
    pub fn decide(&mut self, world: &World) -> Result<Option<Decision>, WorldError> {
        self.target_lock.tick();
        self.heading_lock.tick();
        self.sail_lock.tick();

        let ship = world.ship(self.ship_id)?;
        if !ship.alive {
            return Ok(None);
        }
        self.perception.observe(world, self.ship_id)?;
        let Some(view) = self.perception.view(world.tick(), self.ship_id, ship.kind) else {
            return Ok(None);
        };

        self.update_target(&view);
        let target = self.target.and_then(|id| view.enemy(id)).cloned();

        let props = world.props();
        let lead_ms = (world.tick() - view.tick) as f64 * props.tick_gap_ms();

        if self.heading_lock.is_open() {
            self.desired_heading = target.as_ref().map(|target| {
                helm::desired_heading(
                    &view.me,
                    target,
                    view.wind_direction,
                    self.config.heading_lead_seconds + lead_ms / 1000.0,
                    self.config.upwind_distance,
                )
            });
            self.heading_lock.lock();
        }

        let turn = match self.desired_heading {
            Some(desired) => helm::turn_toward(view.me.orientation, desired, self.config.heading_deadband),
            None => TurnDirection::Hold,
        };

        if self.sail_lock.is_open() {
            let heading = self.desired_heading.unwrap_or(view.me.orientation);
            self.sail_strength = helm::best_sail(
                &ship.stats(),
                view.me.orientation,
                heading,
                view.wind_magnitude * view.wind_direction.cos(),
                view.wind_magnitude * view.wind_direction.sin(),
                props.sail_strength_exponent,
            );
            self.sail_lock.lock();
        }

        let ballistics = Ballistics::new(props, view.wind_magnitude, view.wind_direction, lead_ms);
        let solution = plan_fire(
            &view.me,
            &ship.cannons,
            &view.enemies,
            &ballistics,
            self.config.acceptable_miss_fraction,
        );

        trace!(
            ship_id = %self.ship_id,
            tick = world.tick(),
            target = ?self.target,
            fire = solution.fire,
            "Bot decided"
        );

        Ok(Some(Decision {
            turn,
            sail_strength: self.sail_strength,
            aim: solution.aim,
            fire_cannons: solution.fire,
        }))
    }

    /// Keep the current target unless its lock expired or it is gone
    fn update_target(&mut self, view: &PerceivedWorld) {
        let still_valid = self.target.is_some_and(|id| view.enemy(id).is_some());
        if still_valid && !self.target_lock.is_open() {
            return;
        }
        self.target = closest_enemy(&view.me, &view.enemies).map(|enemy| enemy.id);
        self.target_lock.lock();
    }
}

fn closest_enemy<'a>(me: &PerceivedShip, enemies: &'a [PerceivedShip]) -> Option<&'a PerceivedShip> {
    enemies.iter().min_by(|a, b| {
        let da = PhysicsSystem::distance(me.x, me.y, a.x, a.y);
        let db = PhysicsSystem::distance(me.x, me.y, b.x, b.y);
        da.total_cmp(&db).then(a.id.cmp(&b.id))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::GameProperties;
    use crate::game::physics::ShipKind;
    use crate::game::world::Authority;

    fn exact_config() -> BotConfig {
        BotConfig {
            noise: NoiseProfile::exact(),
            ..BotConfig::default()
        }
    }

    #[test]
    fn waits_for_perception_history() {
        let mut world = World::new(Arc::new(GameProperties::default()), 4, Authority::Server);
        let me = world.spawn_ship(ShipKind::Brig, 0.0, 0.0, 0.0);
        world.spawn_ship(ShipKind::Brig, 0.0, 300.0, 0.0);
        let mut bot = BotController::new(me, 4, exact_config());

        assert_eq!(bot.decide(&world), Ok(None));
        world.step().expect("step");
        assert_eq!(bot.decide(&world), Ok(None));
        world.step().expect("step");
        assert!(bot.decide(&world).expect("ship exists").is_some());
    }

    #[test]
    fn targets_the_closest_enemy_and_fires_abeam() {
        let mut world = World::new(Arc::new(GameProperties::default()), 4, Authority::Server);
        let me = world.spawn_ship(ShipKind::Brig, 0.0, 0.0, 0.0);
        let near = world.spawn_ship(ShipKind::Brig, 0.0, 250.0, 0.0);
        world.spawn_ship(ShipKind::Brig, 0.0, -500.0, 0.0);
        let mut bot = BotController::new(me, 4, exact_config());

        let mut decision = None;
        while decision.is_none() {
            decision = bot.decide(&world).expect("ship exists");
            world.step().expect("step");
        }
        let decision = decision.expect("decided");
        assert_eq!(bot.target(), Some(near));
        assert!(decision.is_firing());
        assert!((0.0..=1.0).contains(&decision.sail_strength));
    }

    #[test]
    fn sunk_bots_stay_silent() {
        let mut world = World::new(Arc::new(GameProperties::default()), 4, Authority::Server);
        let me = world.spawn_ship(ShipKind::Sloop, 0.0, 0.0, 0.0);
        world.sink_ship(me).expect("ship exists");
        let mut bot = BotController::new(me, 4, exact_config());
        assert_eq!(bot.decide(&world), Ok(None));
    }

    #[test]
    fn bot_seeds_differ_per_ship() {
        assert_ne!(bot_seed(7, EntityId(0)), bot_seed(7, EntityId(1)));
        assert_eq!(bot_seed(7, EntityId(3)), bot_seed(7, EntityId(3)));
    }
}
