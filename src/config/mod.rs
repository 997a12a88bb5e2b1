//! Configuration module - environment variable parsing and static game properties

mod properties;

pub use properties::{CannonBallProperties, GameProperties, WindProperties};

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Optional JSON file overriding the default game properties
    pub game_properties_path: Option<PathBuf>,
    /// Bots added to every new match
    pub bots_per_match: usize,
    /// Maximum participants (humans + bots) per match
    pub max_players: usize,
    /// Fixed seed for every match (random when unset)
    pub match_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            game_properties_path: env::var("GAME_PROPERTIES_PATH").ok().map(PathBuf::from),
            bots_per_match: parse_var("BOTS_PER_MATCH")?.unwrap_or(1),
            max_players: parse_var("MAX_PLAYERS")?.unwrap_or(4),
            match_seed: parse_var("MATCH_SEED")?,
        })
    }

    /// Load the game properties this config points at (defaults when unset)
    pub fn load_game_properties(&self) -> Result<GameProperties, ConfigError> {
        match &self.game_properties_path {
            Some(path) => GameProperties::from_file(path),
            None => Ok(GameProperties::default()),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Failed to read game properties: {0}")]
    PropertiesIo(#[from] std::io::Error),

    #[error("Malformed game properties: {0}")]
    PropertiesFormat(#[from] serde_json::Error),

    #[error("Game property out of range: {0}")]
    PropertyOutOfRange(&'static str),
}
