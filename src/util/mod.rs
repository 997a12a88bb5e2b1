//! Shared utilities

pub mod lock;
pub mod rate_limit;
pub mod time;
