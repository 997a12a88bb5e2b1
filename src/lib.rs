//! Broadside: a tick-based naval combat simulation
//!
//! The same deterministic core runs on both sides of the wire. The server
//! owns the authoritative world and resolves combat; clients mirror it and
//! fold in late server events with tick catch-up. Bots sail and shoot with
//! the same physics the cannonballs obey.

pub mod app;
pub mod bot;
pub mod config;
pub mod game;
pub mod http;
pub mod mailbox;
pub mod util;
pub mod ws;
