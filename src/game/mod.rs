//! Game simulation modules

pub mod catch_up;
pub mod client;
pub mod clock;
pub mod combat;
pub mod decision;
pub mod ids;
pub mod r#match;
pub mod mode;
pub mod outcome;
pub mod physics;
pub mod replay;
pub mod snapshot;
pub mod wind;
pub mod world;

pub use client::ClientSession;
pub use r#match::{ClientProxy, GameMatch, MatchHandle, MatchRegistry, MatchSettings, ServerMatch};
pub use outcome::{EndReason, Outcome, SessionError};
pub use world::{Authority, World, WorldError, WorldEvent};

/// One discrete simulation step
pub type Tick = u64;
