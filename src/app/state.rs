//! Application state shared across routes

use std::sync::Arc;

use crate::config::{Config, ConfigError, GameProperties};
use crate::game::MatchRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub props: Arc<GameProperties>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let props = Arc::new(config.load_game_properties()?);
        Ok(Self {
            config: Arc::new(config),
            props,
            match_registry: Arc::new(MatchRegistry::new()),
        })
    }
}
