//! WebSocket protocol message definitions
//! These are the wire types for client-server communication. Every message
//! carries a `subject`; receivers file it in the mailbox folder of that name.

use serde::{Deserialize, Serialize};

use crate::game::combat::CannonBall;
use crate::game::decision::Decision;
use crate::game::ids::EntityId;
use crate::game::outcome::EndReason;
use crate::game::physics::ShipKind;
use crate::game::snapshot::ShipState;
use crate::game::Tick;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum ClientMsg {
    /// New standing orders for the client's ship
    Decision {
        /// Client tick the decision was made at
        tick: Tick,
        decision: Decision,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current match
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First message of a session: who you are and where the world stands
    Welcome {
        ship_id: EntityId,
        /// Seed for the wind
        seed: u64,
        server_tick: Tick,
        ships: Vec<ShipState>,
    },

    /// A ship joined the match
    ShipSpawned { tick: Tick, ship: ShipState },

    /// A ship's standing orders changed
    ShipDecision {
        tick: Tick,
        ship_id: EntityId,
        decision: Decision,
    },

    /// A cannon fired; `ball.launch_tick` is the tick it left the muzzle
    CannonLaunch { tick: Tick, ball: CannonBall },

    /// Periodic authoritative ship state
    PositionUpdate { tick: Tick, ships: Vec<ShipState> },

    /// A ball struck a ship
    ShipHit {
        tick: Tick,
        ship_id: EntityId,
        ball_id: EntityId,
        health: f64,
    },

    /// A ball splashed into open water
    CannonBallSplash { tick: Tick, ball_id: EntityId },

    ShipSunk { tick: Tick, ship_id: EntityId },

    /// Match has ended
    MatchEnd { tick: Tick, reason: EndReason },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// Mailbox folder this message belongs in
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Decision { .. } => "decision",
            Self::Ping { .. } => "ping",
            Self::Leave => "leave",
        }
    }
}

impl ServerMsg {
    /// Mailbox folder this message belongs in
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::ShipSpawned { .. } => "ship_spawned",
            Self::ShipDecision { .. } => "ship_decision",
            Self::CannonLaunch { .. } => "cannon_launch",
            Self::PositionUpdate { .. } => "position_update",
            Self::ShipHit { .. } => "ship_hit",
            Self::CannonBallSplash { .. } => "cannon_ball_splash",
            Self::ShipSunk { .. } => "ship_sunk",
            Self::MatchEnd { .. } => "match_end",
            Self::Error { .. } => "error",
            Self::Pong { .. } => "pong",
        }
    }

    /// Server tick the message describes, if it is tick-stamped
    pub fn tick(&self) -> Option<Tick> {
        match self {
            Self::Welcome { server_tick, .. } => Some(*server_tick),
            Self::ShipSpawned { tick, .. }
            | Self::ShipDecision { tick, .. }
            | Self::CannonLaunch { tick, .. }
            | Self::PositionUpdate { tick, .. }
            | Self::ShipHit { tick, .. }
            | Self::CannonBallSplash { tick, .. }
            | Self::ShipSunk { tick, .. }
            | Self::MatchEnd { tick, .. } => Some(*tick),
            Self::Error { .. } | Self::Pong { .. } => None,
        }
    }
}

/// Ship requested when joining
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub kind: ShipKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_tag_matches_folder_name() {
        let messages = [
            ServerMsg::ShipSunk { tick: 4, ship_id: EntityId(1) },
            ServerMsg::PositionUpdate { tick: 4, ships: Vec::new() },
            ServerMsg::MatchEnd {
                tick: 9,
                reason: EndReason::Victory { winner: EntityId(0) },
            },
            ServerMsg::Pong { t: 3 },
        ];
        for message in messages {
            let value = serde_json::to_value(&message).expect("serialize");
            assert_eq!(value["subject"], message.subject());
        }
        let leave = serde_json::to_value(ClientMsg::Leave).expect("serialize");
        assert_eq!(leave["subject"], ClientMsg::Leave.subject());
    }

    #[test]
    fn decision_parses_from_client_json() {
        let json = r#"{"subject":"decision","tick":12,"decision":{"turn":"starboard","sail_strength":0.5,"aim":{"state":"aiming","x":10.0,"y":-4.0},"fire_cannons":true}}"#;
        let parsed: ClientMsg = serde_json::from_str(json).expect("valid message");
        let ClientMsg::Decision { tick, decision } = parsed else {
            panic!("expected a decision");
        };
        assert_eq!(tick, 12);
        assert!(decision.is_firing());
    }
}
