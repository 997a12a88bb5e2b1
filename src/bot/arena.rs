//! Headless bot-versus-bot matches
//!
//! Runs a whole match on one thread as fast as possible, with no scheduler
//! and no network. Used to tune bots and to check that a seed fully
//! determines a match.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GameProperties;
use crate::game::mode::{GameMode, ModeRules};
use crate::game::outcome::EndReason;
use crate::game::physics::ShipKind;
use crate::game::replay::{Replay, ReplayRecorder};
use crate::game::snapshot::WorldSnapshot;
use crate::game::world::{ring_position, Authority, World, WorldError};
use crate::game::Tick;

use super::{BotConfig, BotController};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub seed: u64,
    pub fleet: Vec<ShipKind>,
    pub bot: BotConfig,
    pub mode: GameMode,
    /// Spawn ring radius
    pub ring_radius: f64,
    /// Overrides the properties' safety cap
    pub tick_cap: Option<Tick>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            fleet: vec![ShipKind::Brig, ShipKind::Brig],
            bot: BotConfig::default(),
            mode: GameMode::default(),
            ring_radius: 250.0,
            tick_cap: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArenaResult {
    pub end: EndReason,
    pub ticks: Tick,
    pub checksum: String,
    pub replay: Replay,
}

pub fn run_arena(props: Arc<GameProperties>, config: &ArenaConfig) -> Result<ArenaResult, WorldError> {
    let cap = config.tick_cap.unwrap_or(props.safety_tick_cap);
    let mut world = World::new(props, config.seed, Authority::Server);

    let count = config.fleet.len();
    let mut bots: Vec<BotController> = config
        .fleet
        .iter()
        .enumerate()
        .map(|(index, kind)| {
            let (x, y, orientation) = ring_position(index, count, config.ring_radius);
            let ship_id = world.spawn_ship(*kind, x, y, orientation);
            BotController::new(ship_id, config.seed, config.bot)
        })
        .collect();
    let mut recorder = ReplayRecorder::new(&world);

    let end = loop {
        if let Some(reason) = config.mode.check_end(&world) {
            break reason;
        }
        if world.tick() >= cap {
            break EndReason::TickCapReached;
        }

        let tick = world.tick();
        for bot in &mut bots {
            if let Some(decision) = bot.decide(&world)? {
                recorder.record_decision(tick, bot.ship_id(), decision);
                world.apply_decision(bot.ship_id(), &decision)?;
            }
        }
        world.step()?;
    };

    let checksum = WorldSnapshot::capture(&world).checksum();
    info!(seed = config.seed, ticks = world.tick(), ?end, mode = config.mode.name(), "Arena match finished");
    Ok(ArenaResult {
        end,
        ticks: world.tick(),
        checksum,
        replay: recorder.finish(&world),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_lone_ship_never_wins_by_default() {
        let config = ArenaConfig {
            fleet: vec![ShipKind::Sloop],
            tick_cap: Some(30),
            ..ArenaConfig::default()
        };
        let result = run_arena(Arc::new(GameProperties::default()), &config).expect("arena runs");
        assert_eq!(result.end, EndReason::TickCapReached);
        assert_eq!(result.ticks, 30);
    }

    #[test]
    fn same_seed_same_match() {
        let props = Arc::new(GameProperties::default());
        let config = ArenaConfig {
            seed: 77,
            tick_cap: Some(400),
            ..ArenaConfig::default()
        };
        let first = run_arena(props.clone(), &config).expect("arena runs");
        let second = run_arena(props, &config).expect("arena runs");
        assert_eq!(first.end, second.end);
        assert_eq!(first.ticks, second.ticks);
        assert_eq!(first.checksum, second.checksum);
        assert!(first.ticks <= 400);
    }
}
