//! One simulated sea: ships, cannonballs and wind, advanced a tick at a time
//!
//! The server runs an authoritative world that fires cannons and resolves
//! hits. Clients run a mirror that only moves things; launches, hits and
//! sinkings reach it as server events and are folded in with catch-up.

use std::collections::BTreeSet;
use std::f64::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::GameProperties;

use super::catch_up::{catch_up, ReconcileError, TickMotion};
use super::combat::{CannonBall, CombatSystem};
use super::decision::Decision;
use super::ids::{EntityId, IdError, IdManager};
use super::physics::{Ship, ShipKind};
use super::snapshot::ShipState;
use super::wind::{Wind, WindHistory, WindHistoryError};
use super::Tick;

/// Who owns the truth in this world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Fires cannons and resolves hits
    Server,
    /// Mirrors a server; only integrates motion
    Client,
}

/// Registry entry: every entity shares one ID space
#[derive(Debug, Clone)]
pub enum Entity {
    Ship(Ship),
    CannonBall(CannonBall),
}

/// Things that happened during a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorldEvent {
    CannonLaunched {
        tick: Tick,
        ball: CannonBall,
    },
    CannonBallSplashed {
        tick: Tick,
        ball_id: EntityId,
    },
    ShipHit {
        tick: Tick,
        ship_id: EntityId,
        ball_id: EntityId,
        shooter_id: EntityId,
        damage: f64,
        health: f64,
    },
    ShipSunk {
        tick: Tick,
        ship_id: EntityId,
        by: Option<EntityId>,
    },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WorldError {
    #[error(transparent)]
    Id(#[from] IdError),

    #[error("entity {0} is not a ship")]
    NotAShip(EntityId),

    #[error("entity {0} is not a cannonball")]
    NotACannonBall(EntityId),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Wind(#[from] WindHistoryError),
}

pub struct World {
    props: Arc<GameProperties>,
    authority: Authority,
    tick: Tick,
    wind: Wind,
    wind_history: WindHistory,
    entities: IdManager<Entity>,
    ship_ids: Vec<EntityId>,
    active_balls: BTreeSet<EntityId>,
}

impl World {
    pub fn new(props: Arc<GameProperties>, seed: u64, authority: Authority) -> Self {
        Self::starting_at(props, seed, authority, 0)
    }

    /// A world whose clock starts at `tick`, with the wind already advanced to it
    pub fn starting_at(props: Arc<GameProperties>, seed: u64, authority: Authority, tick: Tick) -> Self {
        let mut wind = Wind::new(props.wind.clone(), seed);
        wind.fast_forward(tick);
        Self {
            wind_history: WindHistory::new(props.wind_history_len()),
            props,
            authority,
            tick,
            wind,
            entities: IdManager::new(),
            ship_ids: Vec::new(),
            active_balls: BTreeSet::new(),
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn props(&self) -> &Arc<GameProperties> {
        &self.props
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn wind(&self) -> &Wind {
        &self.wind
    }

    pub fn wind_history(&self) -> &WindHistory {
        &self.wind_history
    }

    pub fn seed(&self) -> u64 {
        self.wind.seed()
    }

    /// Spawn a fresh ship under a newly generated ID
    pub fn spawn_ship(&mut self, kind: ShipKind, x: f64, y: f64, orientation: f64) -> EntityId {
        let id = self.entities.generate_new_id();
        let ship = Ship::new(id, kind, x, y, orientation, &self.props);
        // Freshly generated IDs are always in range.
        let _ = self.entities.set_id_reference(id, Entity::Ship(ship));
        self.ship_ids.push(id);
        debug!(ship_id = %id, ?kind, x, y, "Ship spawned");
        id
    }

    /// Bind a ship whose ID was assigned elsewhere
    pub fn insert_ship(&mut self, ship: Ship) -> Result<(), WorldError> {
        let id = ship.id;
        self.entities.reserve_through(id);
        if let Ok(Entity::CannonBall(_)) = self.entities.get_id_reference(id) {
            return Err(WorldError::NotAShip(id));
        }
        self.entities.set_id_reference(id, Entity::Ship(ship))?;
        if !self.ship_ids.contains(&id) {
            self.ship_ids.push(id);
            self.ship_ids.sort_unstable();
        }
        Ok(())
    }

    pub fn ship(&self, id: EntityId) -> Result<&Ship, WorldError> {
        match self.entities.get_id_reference(id)? {
            Entity::Ship(ship) => Ok(ship),
            Entity::CannonBall(_) => Err(WorldError::NotAShip(id)),
        }
    }

    pub fn ship_mut(&mut self, id: EntityId) -> Result<&mut Ship, WorldError> {
        match self.entities.get_id_reference_mut(id)? {
            Entity::Ship(ship) => Ok(ship),
            Entity::CannonBall(_) => Err(WorldError::NotAShip(id)),
        }
    }

    /// Every ship ever spawned, sunk ones included, in ID order
    pub fn ships(&self) -> impl Iterator<Item = &Ship> {
        self.ship_ids.iter().filter_map(|id| self.ship(*id).ok())
    }

    pub fn alive_count(&self) -> usize {
        self.ships().filter(|ship| ship.alive).count()
    }

    pub fn cannon_ball(&self, id: EntityId) -> Result<&CannonBall, WorldError> {
        match self.entities.get_id_reference(id)? {
            Entity::CannonBall(ball) => Ok(ball),
            Entity::Ship(_) => Err(WorldError::NotACannonBall(id)),
        }
    }

    /// Cannonballs in flight, in ID order
    pub fn cannon_balls(&self) -> impl Iterator<Item = &CannonBall> {
        self.active_balls.iter().filter_map(|id| self.cannon_ball(*id).ok())
    }

    pub fn apply_decision(&mut self, id: EntityId, decision: &Decision) -> Result<(), WorldError> {
        let ship = self.ship_mut(id)?;
        if ship.alive {
            ship.apply_decision(decision);
        }
        Ok(())
    }

    pub fn sink_ship(&mut self, id: EntityId) -> Result<(), WorldError> {
        self.ship_mut(id)?.sink();
        Ok(())
    }

    pub fn set_ship_health(&mut self, id: EntityId, health: f64) -> Result<(), WorldError> {
        let ship = self.ship_mut(id)?;
        ship.health = health;
        if health <= 0.0 {
            ship.sink();
        }
        Ok(())
    }

    /// Add a ball the server launched at `ball.launch_tick`, replaying the
    /// ticks it spent in flight before this world heard about it.
    pub fn insert_cannon_ball(&mut self, mut ball: CannonBall) -> Result<(), WorldError> {
        let launch_tick = ball.launch_tick;
        catch_up(&mut ball, launch_tick, self.tick, &self.wind_history, &self.props)?;

        let id = ball.id;
        self.entities.reserve_through(id);
        let landed = ball.has_landed(self.tick);
        self.entities.set_id_reference(id, Entity::CannonBall(ball))?;
        if landed {
            self.entities.retire(id)?;
            trace!(ball_id = %id, tick = self.tick, "Late cannonball already splashed");
        } else {
            self.active_balls.insert(id);
        }
        Ok(())
    }

    /// Drop a ball the server resolved; a ball that already splashed locally is fine
    pub fn remove_cannon_ball(&mut self, id: EntityId) -> Result<(), WorldError> {
        if self.active_balls.remove(&id) {
            self.entities.retire(id)?;
        }
        Ok(())
    }

    /// Overwrite a ship with server state from `state_tick` and replay it to now.
    /// `orders` are decisions the server gave the ship, oldest first; those
    /// stamped before `state_tick` are already part of the state and skipped.
    pub fn reconcile_ship(
        &mut self,
        state: &ShipState,
        state_tick: Tick,
        orders: &[(Tick, Decision)],
    ) -> Result<(), WorldError> {
        let mut ship = state.to_ship(&self.props);
        let mut at = state_tick;
        for (order_tick, decision) in orders.iter().filter(|(tick, _)| *tick >= state_tick) {
            let order_tick = (*order_tick).min(self.tick);
            catch_up(&mut ship, at, order_tick, &self.wind_history, &self.props)?;
            at = order_tick;
            if ship.alive {
                ship.apply_decision(decision);
            }
        }
        catch_up(&mut ship, at, self.tick, &self.wind_history, &self.props)?;
        self.insert_ship(ship)
    }

    /// Advance one tick. The wind sample recorded for this tick drives all motion.
    pub fn step(&mut self) -> Result<Vec<WorldEvent>, WorldError> {
        let tick = self.tick;
        let sample = self.wind.sample(tick);
        self.wind_history.record(sample)?;

        let mut events = Vec::new();

        for id in self.ship_ids.clone() {
            let ship = self.ship_mut(id)?;
            if !ship.alive {
                continue;
            }
            ship.tick_reloads();
            if self.authority == Authority::Server {
                self.fire_cannons(id, tick, &mut events)?;
            }
        }

        for id in &self.ship_ids {
            if let Ok(Entity::Ship(ship)) = self.entities.get_id_reference_mut(*id) {
                ship.tick_motion(&sample, &self.props);
            }
        }
        for id in &self.active_balls {
            if let Ok(Entity::CannonBall(ball)) = self.entities.get_id_reference_mut(*id) {
                ball.tick_motion(&sample, &self.props);
            }
        }

        self.tick += 1;
        self.resolve_landings(&mut events)?;
        self.wind.tick();

        Ok(events)
    }

    fn fire_cannons(&mut self, ship_id: EntityId, tick: Tick, events: &mut Vec<WorldEvent>) -> Result<(), WorldError> {
        let ship = self.ship_mut(ship_id)?;
        if !ship.decision().is_firing() {
            return Ok(());
        }
        let Some((aim_x, aim_y)) = ship.aim.offset() else {
            return Ok(());
        };
        let target = (ship.x + aim_x, ship.y + aim_y);

        let mut muzzles = Vec::new();
        for index in CombatSystem::cannons_bearing(ship, target.0, target.1) {
            if let Some(position) = ship.cannon_position(index) {
                ship.cannons[index].reload.lock();
                muzzles.push(position);
            }
        }

        for muzzle in muzzles {
            let id = self.entities.generate_new_id();
            let ball = CannonBall::aimed(id, ship_id, muzzle, target, tick, &self.props);
            events.push(WorldEvent::CannonLaunched { tick, ball: ball.clone() });
            self.entities.set_id_reference(id, Entity::CannonBall(ball))?;
            self.active_balls.insert(id);
        }
        Ok(())
    }

    fn resolve_landings(&mut self, events: &mut Vec<WorldEvent>) -> Result<(), WorldError> {
        let tick = self.tick;
        let landed: Vec<EntityId> = self
            .cannon_balls()
            .filter(|ball| ball.has_landed(tick))
            .map(|ball| ball.id)
            .collect();

        for ball_id in landed {
            self.active_balls.remove(&ball_id);
            let ball = match self.entities.retire(ball_id)? {
                Entity::CannonBall(ball) => ball,
                Entity::Ship(_) => return Err(WorldError::NotACannonBall(ball_id)),
            };

            if self.authority == Authority::Client {
                continue;
            }

            let Some(target_id) = CombatSystem::landing_target(&ball, self.ships()) else {
                events.push(WorldEvent::CannonBallSplashed {
                    tick,
                    ball_id,
                });
                continue;
            };

            let damage = self.props.cannon_ball.damage;
            let target = self.ship_mut(target_id)?;
            let (health, sunk) = CombatSystem::apply_damage(target.health, damage);
            target.health = health;
            events.push(WorldEvent::ShipHit {
                tick,
                ship_id: target_id,
                ball_id,
                shooter_id: ball.shooter_id,
                damage,
                health,
            });
            if sunk {
                target.sink();
                debug!(ship_id = %target_id, by = %ball.shooter_id, tick, "Ship sunk");
                events.push(WorldEvent::ShipSunk {
                    tick,
                    ship_id: target_id,
                    by: Some(ball.shooter_id),
                });
            }
        }
        Ok(())
    }
}

/// Evenly spaced spawn point on a ring, facing along it
pub fn ring_position(index: usize, count: usize, radius: f64) -> (f64, f64, f64) {
    let angle = TAU * index as f64 / count.max(1) as f64;
    (radius * angle.cos(), radius * angle.sin(), (angle + FRAC_PI_2).rem_euclid(TAU))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::decision::Aim;

    fn props() -> Arc<GameProperties> {
        Arc::new(GameProperties::default())
    }

    #[test]
    fn late_cannonball_matches_one_flown_live() {
        let props = props();
        let ball = CannonBall::aimed(EntityId(7), EntityId(0), (0.0, 0.0), (500.0, 40.0), 10, &props);
        let mut live = World::new(props.clone(), 21, Authority::Client);
        let mut late = World::new(props.clone(), 21, Authority::Client);

        for _ in 0..10 {
            live.step().expect("step");
            late.step().expect("step");
        }
        live.insert_cannon_ball(ball.clone()).expect("launched now");
        for _ in 10..35 {
            live.step().expect("step");
            late.step().expect("step");
        }
        late.insert_cannon_ball(ball).expect("launch still in history");

        let flown = live.cannon_ball(EntityId(7)).expect("still in flight");
        assert_eq!(late.cannon_ball(EntityId(7)), Ok(flown));
        assert_eq!(late.cannon_balls().count(), 1);
    }

    #[test]
    fn each_step_records_one_wind_sample() {
        let mut world = World::new(props(), 5, Authority::Server);
        for _ in 0..12 {
            world.step().expect("step");
        }
        assert_eq!(world.tick(), 12);
        assert_eq!(world.wind_history().len(), 12);
        assert_eq!(world.wind_history().latest().map(|s| s.tick), Some(11));
    }

    #[test]
    fn ships_and_balls_share_one_id_space() {
        let mut world = World::new(props(), 5, Authority::Server);
        let shooter = world.spawn_ship(ShipKind::Brig, 0.0, 0.0, 0.0);
        let target = world.spawn_ship(ShipKind::Brig, 0.0, 200.0, 0.0);
        world
            .apply_decision(
                shooter,
                &Decision {
                    aim: Aim::Aiming { x: 0.0, y: 200.0 },
                    fire_cannons: true,
                    ..Decision::default()
                },
            )
            .expect("shooter exists");

        let events = world.step().expect("step");
        let launched: Vec<EntityId> = events
            .iter()
            .filter_map(|event| match event {
                WorldEvent::CannonLaunched { ball, .. } => Some(ball.id),
                _ => None,
            })
            .collect();
        assert_eq!(launched, vec![EntityId(2), EntityId(3)]);
        assert_eq!(world.cannon_balls().count(), 2);
        assert_eq!(world.ship(target).map(|s| s.health), Ok(5.0));
        assert!(matches!(world.ship(EntityId(2)), Err(WorldError::NotAShip(_))));
    }

    #[test]
    fn broadside_hits_a_stationary_target() {
        let mut world = World::new(props(), 5, Authority::Server);
        let shooter = world.spawn_ship(ShipKind::Brig, 0.0, 0.0, 0.0);
        let target = world.spawn_ship(ShipKind::Brig, 0.0, 150.0, 0.0);
        world
            .apply_decision(
                shooter,
                &Decision {
                    aim: Aim::Aiming { x: 0.0, y: 150.0 },
                    fire_cannons: true,
                    ..Decision::default()
                },
            )
            .expect("shooter exists");
        world.step().expect("fire");
        world.apply_decision(shooter, &Decision::default()).expect("shooter exists");

        let mut hits = 0;
        for _ in 0..world.props().max_flight_ticks() {
            hits += world
                .step()
                .expect("step")
                .iter()
                .filter(|event| matches!(event, WorldEvent::ShipHit { ship_id, .. } if *ship_id == target))
                .count();
        }
        // Wind drift is small over a short flight; both balls land on the hull.
        assert_eq!(hits, 2);
        assert_eq!(world.ship(target).map(|s| s.health), Ok(3.0));
        assert_eq!(world.cannon_balls().count(), 0);
    }

    #[test]
    fn client_worlds_never_fire() {
        let mut world = World::new(props(), 5, Authority::Client);
        let ship = Ship::new(EntityId(3), ShipKind::Sloop, 0.0, 0.0, 0.0, world.props());
        world.insert_ship(ship).expect("insert");
        world
            .apply_decision(
                EntityId(3),
                &Decision {
                    aim: Aim::Aiming { x: 0.0, y: 100.0 },
                    fire_cannons: true,
                    ..Decision::default()
                },
            )
            .expect("ship exists");
        let events = world.step().expect("step");
        assert!(events.is_empty());
        assert_eq!(world.cannon_balls().count(), 0);
    }

    #[test]
    fn late_ball_that_already_landed_is_retired() {
        let mut world = World::new(props(), 5, Authority::Client);
        for _ in 0..30 {
            world.step().expect("step");
        }
        let ball = CannonBall::aimed(EntityId(7), EntityId(0), (0.0, 0.0), (60.0, 0.0), 20, world.props());
        assert!(ball.death_tick < 30);
        world.insert_cannon_ball(ball).expect("within history");
        assert_eq!(world.cannon_balls().count(), 0);
        assert!(matches!(world.cannon_ball(EntityId(7)), Err(WorldError::Id(IdError::Retired(_)))));
    }

    #[test]
    fn ring_positions_are_spread_evenly() {
        let (x0, y0, _) = ring_position(0, 2, 100.0);
        let (x1, y1, _) = ring_position(1, 2, 100.0);
        assert!((x0 - 100.0).abs() < 1e-9 && y0.abs() < 1e-9);
        assert!((x1 + 100.0).abs() < 1e-9 && y1.abs() < 1e-6);
    }
}
