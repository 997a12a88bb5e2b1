//! Helm and gunnery decisions, produced by players and bots alike

use serde::{Deserialize, Serialize};

/// Which way the helm is turned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    /// Counter-clockwise (-1)
    Port,
    #[default]
    Hold,
    /// Clockwise (+1)
    Starboard,
}

impl TurnDirection {
    pub fn sign(self) -> f64 {
        match self {
            Self::Port => -1.0,
            Self::Hold => 0.0,
            Self::Starboard => 1.0,
        }
    }
}

/// Aim point relative to the ship's position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Aim {
    #[default]
    NotAiming,
    Aiming { x: f64, y: f64 },
}

impl Aim {
    pub fn offset(&self) -> Option<(f64, f64)> {
        match *self {
            Self::Aiming { x, y } => Some((x, y)),
            Self::NotAiming => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub turn: TurnDirection,
    /// Clamped to `[0, 1]` when applied
    pub sail_strength: f64,
    pub aim: Aim,
    /// Only honoured while aiming
    pub fire_cannons: bool,
}

impl Decision {
    pub fn is_firing(&self) -> bool {
        self.fire_cannons && matches!(self.aim, Aim::Aiming { .. })
    }
}
