//! Client-side session: a mirror world kept in step with the server
//!
//! Server messages land in a mailbox, filed by subject. Every frame the
//! session folds in the messages whose tick it has reached, leaves later ones
//! for a future frame, then simulates at most one tick and folds in the
//! results of that step. Orders and launches stamped with a tick take effect
//! as the world steps out of it, matching the server.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::config::GameProperties;
use crate::mailbox::{Mailbox, MailboxAccess, ScanVerdict};
use crate::ws::protocol::{ClientMsg, ServerMsg};
use crate::ws::{self, Transport};

use super::clock::{FramePlan, TickScheduler};
use super::decision::Decision;
use super::ids::EntityId;
use super::outcome::{EndReason, Outcome, SessionError};
use super::snapshot::ShipState;
use super::world::{Authority, World};
use super::Tick;

/// Which messages a mail pass folds in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fold {
    /// Everything due, before stepping from the local tick
    Everything,
    /// Only what the step into the local tick produced
    StepResults,
}

pub struct ClientSession {
    world: World,
    ship_id: EntityId,
    scheduler: TickScheduler,
    mailbox: Arc<Mailbox<ServerMsg>>,
    transport: Arc<dyn Transport>,
    ended: Option<EndReason>,
}

impl ClientSession {
    /// Start a session from the welcome waiting in `mailbox`.
    /// Returns `Ok(None)` while the server has not answered yet.
    pub fn join(
        props: Arc<GameProperties>,
        mailbox: Arc<Mailbox<ServerMsg>>,
        transport: Arc<dyn Transport>,
        now_ms: f64,
    ) -> Result<Option<Self>, SessionError> {
        let welcome = {
            let mut access = mailbox.request_access();
            if let Some(ServerMsg::Error { code, message }) = access.drain_unread("error").pop() {
                return Err(SessionError::Protocol(format!("join refused ({code}): {message}")));
            }
            access.drain_unread("welcome").pop()
        };
        let Some(ServerMsg::Welcome {
            ship_id,
            seed,
            server_tick,
            ships,
        }) = welcome
        else {
            return Ok(None);
        };

        let mut world = World::starting_at(props.clone(), seed, Authority::Client, server_tick);
        for state in &ships {
            world.insert_ship(state.to_ship(&props))?;
        }
        world.ship(ship_id)?;

        info!(ship_id = %ship_id, seed, server_tick, ships = ships.len(), "Joined match");
        Ok(Some(Self {
            world,
            ship_id,
            scheduler: TickScheduler::new(props.tick_rate, now_ms),
            mailbox,
            transport,
            ended: None,
        }))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn ship_id(&self) -> EntityId {
        self.ship_id
    }

    pub fn tick(&self) -> Tick {
        self.world.tick()
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// Send new orders for our ship. They take effect when the server echoes them.
    pub fn submit_decision(&self, decision: Decision) -> Result<(), SessionError> {
        ws::send(
            &*self.transport,
            &ClientMsg::Decision {
                tick: self.world.tick(),
                decision,
            },
        )?;
        Ok(())
    }

    pub fn leave(&self) -> Result<(), SessionError> {
        ws::send(&*self.transport, &ClientMsg::Leave)?;
        Ok(())
    }

    /// Run one frame: fold in due server messages, simulate a tick if one is
    /// owed, then fold in whatever the new tick made due.
    /// Returns the end reason and our outcome once the server has ended the match.
    pub fn frame(&mut self, now_ms: f64) -> Result<Option<(EndReason, Outcome)>, SessionError> {
        if let Some(reason) = &self.ended {
            return Ok(Some((reason.clone(), reason.outcome_for(Some(self.ship_id)))));
        }

        let max_owed = self.world.props().max_delay_ticks();
        let plan = self.scheduler.plan_frame(now_ms, max_owed);
        if let FramePlan::Desync { owed } = plan {
            return Err(SessionError::Desync { owed, max: max_owed });
        }

        self.apply_mail(Fold::Everything)?;
        if self.ended.is_none() && plan == FramePlan::Simulate {
            self.world.step()?;
            self.scheduler.count_tick(now_ms);
            // Results stamped with the tick we just reached are due now.
            // Orders and launches for it wait until we step from it.
            self.apply_mail(Fold::StepResults)?;
        }

        match &self.ended {
            Some(reason) => {
                info!(ship_id = %self.ship_id, tick = self.world.tick(), ?reason, "Match over");
                Ok(Some((reason.clone(), reason.outcome_for(Some(self.ship_id)))))
            }
            None => Ok(None),
        }
    }

    /// Fold in the messages stamped at or before the local tick
    fn apply_mail(&mut self, fold: Fold) -> Result<(), SessionError> {
        let mailbox = Arc::clone(&self.mailbox);
        let mut access = mailbox.request_access();
        let local = self.world.tick();

        if let Some(ServerMsg::Error { code, message }) = access.drain_unread("error").pop() {
            return Err(SessionError::Protocol(format!("server error ({code}): {message}")));
        }
        for pong in access.drain_unread("pong") {
            trace!(?pong, "Pong");
        }

        // State first, then the orders issued from that state onward
        let states = self.take_ship_states(&mut access, local);
        let mut orders: BTreeMap<EntityId, Vec<(Tick, Decision)>> = BTreeMap::new();
        if fold == Fold::Everything {
            for message in take_due(&mut access, "ship_decision", local) {
                if let ServerMsg::ShipDecision { tick, ship_id, decision } = message {
                    orders.entry(ship_id).or_default().push((tick, decision));
                }
            }
        }

        for (ship_id, (tick, state)) in states {
            let ship_orders = orders.remove(&ship_id).unwrap_or_default();
            self.world.reconcile_ship(&state, tick, &ship_orders)?;
        }
        for (ship_id, ship_orders) in orders {
            if let Some((tick, decision)) = ship_orders.last() {
                trace!(ship_id = %ship_id, tick, local, "Applying order");
                self.world.apply_decision(ship_id, decision)?;
            }
        }

        if fold == Fold::Everything {
            for message in take_due(&mut access, "cannon_launch", local) {
                if let ServerMsg::CannonLaunch { ball, .. } = message {
                    self.world.insert_cannon_ball(ball)?;
                }
            }
        }

        for message in take_due(&mut access, "ship_hit", local) {
            if let ServerMsg::ShipHit {
                ship_id,
                ball_id,
                health,
                ..
            } = message
            {
                self.world.remove_cannon_ball(ball_id)?;
                self.world.set_ship_health(ship_id, health)?;
            }
        }

        for message in take_due(&mut access, "cannon_ball_splash", local) {
            if let ServerMsg::CannonBallSplash { ball_id, .. } = message {
                self.world.remove_cannon_ball(ball_id)?;
            }
        }

        for message in take_due(&mut access, "ship_sunk", local) {
            if let ServerMsg::ShipSunk { ship_id, .. } = message {
                self.world.sink_ship(ship_id)?;
            }
        }

        if let Some(ServerMsg::MatchEnd { reason, .. }) = take_due(&mut access, "match_end", local).pop() {
            self.ended = Some(reason);
        }
        Ok(())
    }

    /// Collect the newest usable state per ship from spawns and position
    /// updates. States older than the wind history cannot be replayed and
    /// are dropped.
    fn take_ship_states(
        &self,
        access: &mut MailboxAccess<'_, ServerMsg>,
        local: Tick,
    ) -> BTreeMap<EntityId, (Tick, ShipState)> {
        let oldest = self.world.wind_history().oldest_tick();
        let replayable = |tick: Tick| tick == local || oldest.is_some_and(|oldest| tick >= oldest);

        let mut states: BTreeMap<EntityId, (Tick, ShipState)> = BTreeMap::new();
        let mut keep_newest = |tick: Tick, ship: &ShipState| {
            let newer = states.get(&ship.id).map_or(true, |(known, _)| tick > *known);
            if newer {
                states.insert(ship.id, (tick, ship.clone()));
            }
        };

        for message in take_due(access, "ship_spawned", local) {
            if let ServerMsg::ShipSpawned { tick, ship } = message {
                debug!(ship_id = %ship.id, tick, "Ship joined");
                keep_newest(tick, &ship);
            }
        }

        access.scan("position_update", |message| {
            let ServerMsg::PositionUpdate { tick, ships } = message else {
                return ScanVerdict::Discard;
            };
            if *tick > local {
                return ScanVerdict::Defer;
            }
            if !replayable(*tick) {
                trace!(tick, local, "Position update too old to replay");
                return ScanVerdict::Discard;
            }
            for ship in ships {
                keep_newest(*tick, ship);
            }
            ScanVerdict::Consume
        });
        states
    }
}

/// Consume the messages in `folder` the local tick has reached, oldest first
fn take_due(access: &mut MailboxAccess<'_, ServerMsg>, folder: &str, local: Tick) -> Vec<ServerMsg> {
    access
        .scan(folder, |message| match message.tick() {
            Some(tick) if tick > local => ScanVerdict::Defer,
            _ => ScanVerdict::Consume,
        })
        .consumed
}
