//! How a session ends, and the errors that end it abnormally

use serde::{Deserialize, Serialize};

use crate::ws::TransportError;

use super::catch_up::ReconcileError;
use super::ids::{EntityId, IdError};
use super::wind::WindHistoryError;
use super::world::WorldError;

/// The four outcomes a participant can be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Lose,
    Neutral,
    Error,
}

/// Why a match ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndReason {
    /// One ship left afloat
    Victory { winner: EntityId },
    /// Every ship sank on the same tick
    AllSunk,
    /// The safety cap or mode time limit ran out without a winner
    TickCapReached,
    /// Every human participant left
    Abandoned,
    /// Owed ticks exceeded the tolerated delay
    Desync { owed: u64 },
    /// A peer sent something impossible
    ProtocolViolation { detail: String },
}

impl EndReason {
    pub fn winner(&self) -> Option<EntityId> {
        match self {
            Self::Victory { winner } => Some(*winner),
            _ => None,
        }
    }

    /// Outcome for the participant sailing `ship` (`None` for spectators)
    pub fn outcome_for(&self, ship: Option<EntityId>) -> Outcome {
        match self {
            Self::Desync { .. } | Self::ProtocolViolation { .. } => Outcome::Error,
            Self::Victory { winner } => match ship {
                Some(id) if id == *winner => Outcome::Win,
                Some(_) => Outcome::Lose,
                None => Outcome::Neutral,
            },
            Self::AllSunk | Self::TickCapReached | Self::Abandoned => Outcome::Neutral,
        }
    }
}

/// Everything that can abort a running session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("desync: {owed} ticks owed, at most {max} tolerated")]
    Desync { owed: u64, max: u64 },

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Wind(#[from] WindHistoryError),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub fn end_reason(&self) -> EndReason {
        match self {
            Self::Desync { owed, .. } => EndReason::Desync { owed: *owed },
            other => EndReason::ProtocolViolation {
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victory_maps_to_win_and_lose() {
        let reason = EndReason::Victory { winner: EntityId(2) };
        assert_eq!(reason.outcome_for(Some(EntityId(2))), Outcome::Win);
        assert_eq!(reason.outcome_for(Some(EntityId(1))), Outcome::Lose);
        assert_eq!(reason.outcome_for(None), Outcome::Neutral);
    }

    #[test]
    fn session_errors_end_in_error_outcome() {
        let desync = SessionError::Desync { owed: 90, max: 40 };
        assert_eq!(desync.end_reason(), EndReason::Desync { owed: 90 });

        let reconcile = SessionError::from(ReconcileError::FutureEvent { origin: 9, target: 3 });
        let reason = reconcile.end_reason();
        assert!(matches!(reason, EndReason::ProtocolViolation { .. }));
        assert_eq!(reason.outcome_for(Some(EntityId(0))), Outcome::Error);
    }
}
