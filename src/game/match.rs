//! Match state and authoritative tick loop

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bot::{BotConfig, BotController};
use crate::config::{Config, GameProperties};
use crate::mailbox::{Mailbox, ScanVerdict};
use crate::util::time::{SessionClock, Timer};
use crate::ws::protocol::{ClientMsg, ServerMsg};
use crate::ws::{self, Transport, TransportError};

use super::clock::{FramePlan, TickScheduler};
use super::decision::Decision;
use super::ids::EntityId;
use super::mode::{GameMode, ModeRules};
use super::outcome::EndReason;
use super::physics::ShipKind;
use super::replay::{Replay, ReplayRecorder};
use super::snapshot::{ShipState, SnapshotBuilder};
use super::world::{ring_position, Authority, World, WorldError, WorldEvent};
use super::Tick;

/// A connected human as the match sees it: an inbound mailbox and an outbound transport
pub struct ClientProxy {
    pub mailbox: Arc<Mailbox<ClientMsg>>,
    pub transport: Arc<dyn Transport>,
    pub kind: ShipKind,
}

struct Participant {
    proxy: ClientProxy,
    ship_id: EntityId,
    connected: bool,
    send_failed: bool,
}

impl Participant {
    /// Send one frame. The first failure files a leave for this client,
    /// so the ship goes down on the next tick; later sends are skipped.
    fn send_json(&mut self, match_id: Uuid, value: serde_json::Value) {
        if !self.connected || self.send_failed {
            return;
        }
        if let Err(e) = self.proxy.transport.send_json(value) {
            debug!(match_id = %match_id, ship_id = %self.ship_id, error = %e, "Client send failed");
            self.send_failed = true;
            self.proxy.mailbox.deliver(ClientMsg::Leave, "leave");
        }
    }
}

/// How a match is set up
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub seed: u64,
    pub mode: GameMode,
    /// Seats given to bots when the match opens
    pub bots: usize,
    /// Total seats, bots included
    pub max_players: usize,
    pub bot: BotConfig,
    pub ring_radius: f64,
}

impl MatchSettings {
    pub fn from_config(config: &Config, seed: u64) -> Self {
        Self {
            seed,
            mode: GameMode::default(),
            bots: config.bots_per_match.min(config.max_players),
            max_players: config.max_players,
            bot: BotConfig::default(),
            ring_radius: 300.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("match is full")]
    Full,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    World(#[from] WorldError),
}

/// The authoritative match, advanced one tick at a time by its driver
pub struct ServerMatch {
    id: Uuid,
    world: World,
    settings: MatchSettings,
    clients: Vec<Participant>,
    bots: Vec<BotController>,
    snapshot_builder: SnapshotBuilder,
    recorder: ReplayRecorder,
    broadcast_decisions: HashMap<EntityId, Decision>,
    humans_joined: usize,
}

impl ServerMatch {
    pub fn new(id: Uuid, props: Arc<GameProperties>, settings: MatchSettings) -> Self {
        let mut world = World::new(props.clone(), settings.seed, Authority::Server);
        let seats = settings.max_players.max(1);

        let bots = (0..settings.bots.min(seats))
            .map(|seat| {
                let (x, y, orientation) = ring_position(seat, seats, settings.ring_radius);
                let ship_id = world.spawn_ship(ShipKind::default(), x, y, orientation);
                BotController::new(ship_id, settings.seed, settings.bot)
            })
            .collect();

        let recorder = ReplayRecorder::new(&world);
        let broadcast_decisions = world.ships().map(|ship| (ship.id, ship.decision())).collect();
        Self {
            id,
            world,
            snapshot_builder: SnapshotBuilder::new(props.position_update_interval_ticks),
            settings,
            clients: Vec::new(),
            bots,
            recorder,
            broadcast_decisions,
            humans_joined: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn seats_taken(&self) -> usize {
        self.world.ships().count()
    }

    pub fn is_full(&self) -> bool {
        self.seats_taken() >= self.settings.max_players
    }

    pub fn connected_humans(&self) -> usize {
        self.clients.iter().filter(|client| client.connected).count()
    }

    /// Seat a human: spawn their ship, welcome them and tell everyone else
    pub fn add_client(&mut self, proxy: ClientProxy) -> Result<EntityId, JoinError> {
        if self.is_full() {
            ws::send(
                &*proxy.transport,
                &ServerMsg::Error {
                    code: "match_full".to_string(),
                    message: "Match is full".to_string(),
                },
            )?;
            return Err(JoinError::Full);
        }

        let seat = self.seats_taken();
        let (x, y, orientation) = ring_position(seat, self.settings.max_players, self.settings.ring_radius);
        let ship_id = self.world.spawn_ship(proxy.kind, x, y, orientation);
        let tick = self.world.tick();

        let ship = ShipState::from_ship(self.world.ship(ship_id)?);
        self.recorder.record_spawn(tick, ship.clone());
        self.broadcast_decisions.insert(ship_id, ship.decision());
        self.broadcast(&ServerMsg::ShipSpawned { tick, ship });

        ws::send(
            &*proxy.transport,
            &ServerMsg::Welcome {
                ship_id,
                seed: self.world.seed(),
                server_tick: tick,
                ships: self.world.ships().map(ShipState::from_ship).collect(),
            },
        )?;

        self.clients.push(Participant {
            proxy,
            ship_id,
            connected: true,
            send_failed: false,
        });
        self.humans_joined += 1;
        self.snapshot_builder.force_next();

        info!(
            match_id = %self.id,
            ship_id = %ship_id,
            seats_taken = self.seats_taken(),
            "Player joined match"
        );
        Ok(ship_id)
    }

    /// Run one authoritative tick. Returns the end reason once the match is over.
    pub fn tick(&mut self) -> Result<Option<EndReason>, WorldError> {
        let tick = self.world.tick();

        self.process_client_mail()?;

        for bot in &mut self.bots {
            if let Some(decision) = bot.decide(&self.world)? {
                self.world.apply_decision(bot.ship_id(), &decision)?;
            }
        }

        self.publish_decisions(tick);

        let events = self.world.step()?;
        self.publish_events(events);

        if self.snapshot_builder.should_send() {
            self.broadcast(&ServerMsg::PositionUpdate {
                tick: self.world.tick(),
                ships: SnapshotBuilder::ship_states(&self.world),
            });
        }

        Ok(self.check_end())
    }

    /// Tell everyone the match is over and hand back the replay
    pub fn finish(mut self, reason: EndReason) -> Replay {
        info!(match_id = %self.id, tick = self.world.tick(), ?reason, "Match ended");
        self.broadcast(&ServerMsg::MatchEnd {
            tick: self.world.tick(),
            reason,
        });
        self.recorder.finish(&self.world)
    }

    fn process_client_mail(&mut self) -> Result<(), WorldError> {
        let mut departed = Vec::new();

        for client in self.clients.iter_mut().filter(|client| client.connected) {
            let mut access = client.proxy.mailbox.request_access();

            if access.unread_count("leave") > 0 {
                access.drain_unread("leave");
                departed.push(client.ship_id);
                client.connected = false;
                continue;
            }

            let pings = access.drain_unread("ping");

            // Only the newest decision matters; older ones are superseded
            let mut newest = None;
            access.scan("decision", |message| match message {
                ClientMsg::Decision { decision, .. } if newest.is_none() => {
                    newest = Some(*decision);
                    ScanVerdict::Consume
                }
                _ => ScanVerdict::Discard,
            });
            access.relinquish();

            for ping in pings {
                if let ClientMsg::Ping { t } = ping {
                    match serde_json::to_value(ServerMsg::Pong { t }) {
                        Ok(pong) => client.send_json(self.id, pong),
                        Err(e) => error!(match_id = %self.id, error = %e, "Failed to encode message"),
                    }
                }
            }

            if let Some(decision) = newest {
                self.world.apply_decision(client.ship_id, &decision)?;
            }
        }

        for ship_id in departed {
            self.abandon_ship(ship_id)?;
        }
        Ok(())
    }

    fn abandon_ship(&mut self, ship_id: EntityId) -> Result<(), WorldError> {
        info!(match_id = %self.id, ship_id = %ship_id, "Player left match");
        if self.world.ship(ship_id)?.alive {
            self.world.sink_ship(ship_id)?;
            self.recorder.record_departure(self.world.tick(), ship_id);
            self.broadcast(&ServerMsg::ShipSunk {
                tick: self.world.tick(),
                ship_id,
            });
        }
        Ok(())
    }

    fn publish_decisions(&mut self, tick: Tick) {
        let changed: Vec<(EntityId, Decision)> = self
            .world
            .ships()
            .filter(|ship| ship.alive)
            .map(|ship| (ship.id, ship.decision()))
            .filter(|(id, decision)| self.broadcast_decisions.get(id) != Some(decision))
            .collect();

        for (ship_id, decision) in changed {
            self.broadcast_decisions.insert(ship_id, decision);
            self.recorder.record_decision(tick, ship_id, decision);
            self.broadcast(&ServerMsg::ShipDecision {
                tick,
                ship_id,
                decision,
            });
        }
    }

    fn publish_events(&mut self, events: Vec<WorldEvent>) {
        for event in events {
            let message = match event {
                WorldEvent::CannonLaunched { tick, ball } => ServerMsg::CannonLaunch { tick, ball },
                WorldEvent::CannonBallSplashed { tick, ball_id } => ServerMsg::CannonBallSplash { tick, ball_id },
                WorldEvent::ShipHit {
                    tick,
                    ship_id,
                    ball_id,
                    health,
                    ..
                } => ServerMsg::ShipHit {
                    tick,
                    ship_id,
                    ball_id,
                    health,
                },
                WorldEvent::ShipSunk { tick, ship_id, .. } => {
                    self.snapshot_builder.force_next();
                    ServerMsg::ShipSunk { tick, ship_id }
                }
            };
            self.broadcast(&message);
        }
    }

    fn check_end(&self) -> Option<EndReason> {
        if self.humans_joined > 0 && self.connected_humans() == 0 {
            return Some(EndReason::Abandoned);
        }
        if let Some(reason) = self.settings.mode.check_end(&self.world) {
            return Some(reason);
        }
        if self.world.tick() >= self.world.props().safety_tick_cap {
            return Some(EndReason::TickCapReached);
        }
        None
    }

    /// Send to every connected client; a failed send counts as the client leaving
    fn broadcast(&mut self, message: &ServerMsg) {
        let value = match serde_json::to_value(message) {
            Ok(value) => value,
            Err(e) => {
                error!(match_id = %self.id, error = %e, "Failed to encode message");
                return;
            }
        };
        for client in &mut self.clients {
            client.send_json(self.id, value.clone());
        }
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub join_tx: mpsc::Sender<ClientProxy>,
    pub player_count: Arc<AtomicUsize>,
    /// Seats open to humans
    pub capacity: usize,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn has_room(&self) -> bool {
        self.player_count() < self.capacity
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches.iter().map(|m| m.value().player_count()).sum()
    }

    /// Find a match with a free human seat
    pub fn find_available_match(&self) -> Option<MatchHandle> {
        self.matches
            .iter()
            .find(|entry| entry.value().has_room())
            .map(|entry| entry.value().clone())
    }

    /// Start a match task; it unregisters itself when it ends
    pub fn spawn_match(self: &Arc<Self>, props: Arc<GameProperties>, settings: MatchSettings) -> MatchHandle {
        let (game_match, handle) = GameMatch::new(Uuid::new_v4(), props, settings);
        self.insert(handle.clone());

        let registry = Arc::clone(self);
        let id = handle.id;
        tokio::spawn(async move {
            let replay = game_match.run().await;
            registry.remove(&id);
            debug!(match_id = %id, frames = replay.frames.len(), "Match unregistered");
        });
        handle
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match task
pub struct GameMatch {
    state: ServerMatch,
    join_rx: mpsc::Receiver<ClientProxy>,
    player_count: Arc<AtomicUsize>,
}

impl GameMatch {
    /// Create a new match
    pub fn new(id: Uuid, props: Arc<GameProperties>, settings: MatchSettings) -> (Self, MatchHandle) {
        let (join_tx, join_rx) = mpsc::channel(16);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = MatchHandle {
            id,
            join_tx,
            player_count: player_count.clone(),
            capacity: settings.max_players.saturating_sub(settings.bots),
        };
        let game_match = Self {
            state: ServerMatch::new(id, props, settings),
            join_rx,
            player_count,
        };
        (game_match, handle)
    }

    /// Run the authoritative tick loop until the match ends
    pub async fn run(mut self) -> Replay {
        let id = self.state.id();
        let props = self.state.world().props().clone();
        info!(match_id = %id, seed = self.state.world().seed(), "Match started");

        // Poll twice per tick so timer jitter never costs a whole tick
        let mut frames = interval(Duration::from_secs_f64(props.tick_seconds() / 2.0));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let clock = SessionClock::new();
        let mut scheduler = TickScheduler::new(props.tick_rate, clock.now_ms());
        let max_owed = props.max_delay_ticks();

        let reason = loop {
            frames.tick().await;

            while let Ok(proxy) = self.join_rx.try_recv() {
                if let Err(e) = self.state.add_client(proxy) {
                    warn!(match_id = %id, error = %e, "Join rejected");
                }
                self.player_count
                    .store(self.state.connected_humans(), Ordering::Relaxed);
            }

            match scheduler.plan_frame(clock.now_ms(), max_owed) {
                FramePlan::Idle => continue,
                FramePlan::Desync { owed } => {
                    // The server is its own reference; forgive the stall instead of ending
                    warn!(match_id = %id, owed, "Match loop fell behind");
                    scheduler.add_time_debt(owed as f64 * scheduler.tick_gap_ms());
                    continue;
                }
                FramePlan::Simulate => {}
            }

            let timer = Timer::new();
            let result = self.state.tick();
            scheduler.count_tick(clock.now_ms());

            let elapsed_us = timer.elapsed_micros();
            if elapsed_us as f64 > scheduler.tick_gap_ms() * 1000.0 {
                warn!(match_id = %id, elapsed_us, "Tick overran its budget");
            }
            self.player_count
                .store(self.state.connected_humans(), Ordering::Relaxed);

            match result {
                Ok(Some(reason)) => break reason,
                Ok(None) => {}
                Err(e) => {
                    error!(match_id = %id, error = %e, "Match simulation failed");
                    break EndReason::ProtocolViolation { detail: e.to_string() };
                }
            }
        };

        self.state.finish(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::ChannelTransport;

    fn settings(bots: usize) -> MatchSettings {
        MatchSettings {
            seed: 42,
            mode: GameMode::default(),
            bots,
            max_players: 2,
            bot: BotConfig::default(),
            ring_radius: 250.0,
        }
    }

    fn proxy() -> (ClientProxy, Arc<Mailbox<ClientMsg>>, mpsc::UnboundedReceiver<String>) {
        let (transport, rx) = ChannelTransport::new();
        let mailbox = Arc::new(Mailbox::new());
        (
            ClientProxy {
                mailbox: mailbox.clone(),
                transport: Arc::new(transport),
                kind: ShipKind::Sloop,
            },
            mailbox,
            rx,
        )
    }

    fn subjects(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut subjects = Vec::new();
        while let Ok(text) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&text).expect("json frame");
            subjects.push(value["subject"].as_str().unwrap_or_default().to_string());
        }
        subjects
    }

    #[test]
    fn joining_client_is_welcomed_with_every_ship() {
        let mut server = ServerMatch::new(Uuid::new_v4(), Arc::new(GameProperties::default()), settings(1));
        let (proxy, _, mut rx) = proxy();
        let ship_id = server.add_client(proxy).expect("seat free");
        assert_eq!(ship_id, EntityId(1));

        let text = rx.try_recv().expect("welcome sent");
        let welcome: ServerMsg = serde_json::from_str(&text).expect("server message");
        let ServerMsg::Welcome { ships, server_tick, .. } = welcome else {
            panic!("expected a welcome");
        };
        assert_eq!(server_tick, 0);
        assert_eq!(ships.len(), 2);
    }

    #[test]
    fn full_match_rejects_with_an_error() {
        let mut server = ServerMatch::new(Uuid::new_v4(), Arc::new(GameProperties::default()), settings(2));
        let (proxy, _, mut rx) = proxy();
        assert!(matches!(server.add_client(proxy), Err(JoinError::Full)));
        assert_eq!(subjects(&mut rx), vec!["error"]);
    }

    #[test]
    fn newest_decision_wins_and_is_broadcast() {
        let mut server = ServerMatch::new(Uuid::new_v4(), Arc::new(GameProperties::default()), settings(0));
        let (proxy, mailbox, mut rx) = proxy();
        let ship_id = server.add_client(proxy).expect("seat free");
        subjects(&mut rx);

        for sail in [0.2, 0.9] {
            mailbox.deliver(
                ClientMsg::Decision {
                    tick: 0,
                    decision: Decision {
                        sail_strength: sail,
                        ..Decision::default()
                    },
                },
                "decision",
            );
        }
        server.tick().expect("tick");

        assert_eq!(server.world().ship(ship_id).map(|s| s.sail_strength), Ok(0.9));
        // The join forced a position update on the first tick
        assert_eq!(subjects(&mut rx), vec!["ship_decision", "position_update"]);
        assert_eq!(mailbox.request_access().unread_count("decision"), 0);
    }

    #[test]
    fn leaving_sinks_the_ship_and_abandons_the_match() {
        let mut server = ServerMatch::new(Uuid::new_v4(), Arc::new(GameProperties::default()), settings(1));
        let (proxy, mailbox, _rx) = proxy();
        let ship_id = server.add_client(proxy).expect("seat free");

        mailbox.deliver(ClientMsg::Leave, "leave");
        let end = server.tick().expect("tick");
        assert_eq!(end, Some(EndReason::Abandoned));
        assert_eq!(server.world().ship(ship_id).map(|s| s.alive), Ok(false));
    }

    #[test]
    fn unanswerable_ping_counts_as_leaving() {
        let mut server = ServerMatch::new(Uuid::new_v4(), Arc::new(GameProperties::default()), settings(0));
        let (proxy, mailbox, mut rx) = proxy();
        let ship_id = server.add_client(proxy).expect("seat free");
        server.tick().expect("tick");
        subjects(&mut rx);

        drop(rx);
        mailbox.deliver(ClientMsg::Ping { t: 5 }, "ping");
        assert_eq!(server.tick().expect("tick"), None);
        assert_eq!(mailbox.request_access().unread_count("leave"), 1);

        assert_eq!(server.tick().expect("tick"), Some(EndReason::Abandoned));
        assert_eq!(server.world().ship(ship_id).map(|s| s.alive), Ok(false));
    }

    #[test]
    fn position_updates_follow_the_interval() {
        let props = GameProperties {
            position_update_interval_ticks: 5,
            ..GameProperties::default()
        };
        let mut server = ServerMatch::new(Uuid::new_v4(), Arc::new(props), settings(1));
        let (proxy, _, mut rx) = proxy();
        server.add_client(proxy).expect("seat free");
        subjects(&mut rx);

        for _ in 0..10 {
            server.tick().expect("tick");
        }
        let updates = subjects(&mut rx).iter().filter(|s| *s == "position_update").count();
        // One forced by the join, then one every five ticks
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn registry_tracks_spawned_matches() {
        let registry = Arc::new(MatchRegistry::new());
        let props = Arc::new(GameProperties {
            safety_tick_cap: 5,
            ..GameProperties::default()
        });
        let handle = registry.spawn_match(props, settings(0));
        assert_eq!(registry.active_matches(), 1);
        assert!(registry.find_available_match().is_some());
        assert_eq!(handle.capacity, 2);
    }
}
