//! Game-mode rules, dispatched by the match driver

use serde::{Deserialize, Serialize};

use super::outcome::EndReason;
use super::world::World;
use super::Tick;

/// Rules every game mode provides
pub trait ModeRules {
    fn name(&self) -> &'static str;

    /// Checked once per tick after the world advanced
    fn check_end(&self, world: &World) -> Option<EndReason>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GameMode {
    /// Fight until one ship is left afloat
    #[default]
    LastShipStanding,
    /// Fight until a tick limit; the healthiest ship wins
    TimedSkirmish { tick_limit: Tick },
}

impl ModeRules for GameMode {
    fn name(&self) -> &'static str {
        match self {
            Self::LastShipStanding => "last_ship_standing",
            Self::TimedSkirmish { .. } => "timed_skirmish",
        }
    }

    fn check_end(&self, world: &World) -> Option<EndReason> {
        if let Some(reason) = last_afloat(world) {
            return Some(reason);
        }
        match *self {
            Self::LastShipStanding => None,
            Self::TimedSkirmish { tick_limit } if world.tick() >= tick_limit => {
                Some(healthiest(world).unwrap_or(EndReason::TickCapReached))
            }
            Self::TimedSkirmish { .. } => None,
        }
    }
}

fn last_afloat(world: &World) -> Option<EndReason> {
    let mut afloat = world.ships().filter(|ship| ship.alive);
    match (afloat.next(), afloat.next()) {
        (None, _) if world.ships().next().is_some() => Some(EndReason::AllSunk),
        (Some(only), None) if world.ships().count() > 1 => Some(EndReason::Victory { winner: only.id }),
        _ => None,
    }
}

/// A unique healthiest ship, if any
fn healthiest(world: &World) -> Option<EndReason> {
    let mut afloat: Vec<_> = world.ships().filter(|ship| ship.alive).collect();
    afloat.sort_by(|a, b| b.health.total_cmp(&a.health));
    match afloat.as_slice() {
        [first, second, ..] if first.health > second.health => Some(EndReason::Victory { winner: first.id }),
        [only] => Some(EndReason::Victory { winner: only.id }),
        _ => None,
    }
}
