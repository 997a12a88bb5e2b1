//! Static game properties, loaded once per session and read-only afterwards

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Numeric constants dereferenced by the simulation core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameProperties {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Network delay tolerated before a session is declared desynced
    pub max_delay_ms: u64,
    /// Ticks between authoritative position updates
    pub position_update_interval_ticks: u32,
    /// Hard cap on match length; reaching it ends the match in a tie
    pub safety_tick_cap: u64,
    /// Propulsion scales with `sail_strength.powf(sail_strength_exponent)`
    pub sail_strength_exponent: f64,
    pub wind: WindProperties,
    pub cannon_ball: CannonBallProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindProperties {
    /// Magnitude right after seeding (px/s²)
    pub initial_magnitude: f64,
    pub max_magnitude: f64,
    /// Largest magnitude change in a single tick
    pub magnitude_step: f64,
    /// Largest direction change in a single tick (radians)
    pub direction_step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CannonBallProperties {
    /// Muzzle speed (px/s)
    pub speed: f64,
    /// Longest flight before the ball hits the water
    pub max_flight_ms: f64,
    /// Fraction of the wind acceleration applied to a ball in flight
    pub wind_effect: f64,
    pub damage: f64,
    pub reload_ms: f64,
}

impl Default for GameProperties {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            max_delay_ms: 2000,
            position_update_interval_ticks: 10,
            safety_tick_cap: 20 * 60 * 5,
            sail_strength_exponent: 0.5,
            wind: WindProperties::default(),
            cannon_ball: CannonBallProperties::default(),
        }
    }
}

impl Default for WindProperties {
    fn default() -> Self {
        Self {
            initial_magnitude: 20.0,
            max_magnitude: 60.0,
            magnitude_step: 2.0,
            direction_step: 0.05,
        }
    }
}

impl Default for CannonBallProperties {
    fn default() -> Self {
        Self {
            speed: 300.0,
            max_flight_ms: 2000.0,
            wind_effect: 0.5,
            damage: 1.0,
            reload_ms: 3000.0,
        }
    }
}

impl GameProperties {
    /// Load properties from a JSON file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let properties: Self = serde_json::from_str(&raw)?;
        properties.validate()?;
        Ok(properties)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::PropertyOutOfRange("tick_rate"));
        }
        if self.cannon_ball.speed <= 0.0 {
            return Err(ConfigError::PropertyOutOfRange("cannon_ball.speed"));
        }
        if self.cannon_ball.max_flight_ms <= 0.0 {
            return Err(ConfigError::PropertyOutOfRange("cannon_ball.max_flight_ms"));
        }
        if self.wind.max_magnitude < 0.0 || self.wind.magnitude_step < 0.0 || self.wind.direction_step < 0.0 {
            return Err(ConfigError::PropertyOutOfRange("wind"));
        }
        Ok(())
    }

    /// Milliseconds between two ticks
    pub fn tick_gap_ms(&self) -> f64 {
        1000.0 / self.tick_rate as f64
    }

    /// Seconds of simulated time per tick (physics delta)
    pub fn tick_seconds(&self) -> f64 {
        1.0 / self.tick_rate as f64
    }

    /// Whole ticks needed to cover `ms`, rounded up
    pub fn ms_to_ticks(&self, ms: f64) -> u64 {
        (ms / self.tick_gap_ms()).ceil().max(0.0) as u64
    }

    /// Owed ticks beyond this count are a desync
    pub fn max_delay_ticks(&self) -> u64 {
        self.ms_to_ticks(self.max_delay_ms as f64)
    }

    /// Wind samples kept for catch-up; must cover at least the tolerated delay
    pub fn wind_history_len(&self) -> usize {
        (self.max_delay_ticks() * 2 + 1) as usize
    }

    /// Longest cannonball flight in ticks
    pub fn max_flight_ticks(&self) -> u64 {
        self.ms_to_ticks(self.cannon_ball.max_flight_ms).max(1)
    }

    pub fn reload_ticks(&self) -> u32 {
        self.ms_to_ticks(self.cannon_ball.reload_ms) as u32
    }

    /// Farthest a ball can land in still air
    pub fn still_air_range(&self) -> f64 {
        self.cannon_ball.speed * self.max_flight_ticks() as f64 * self.tick_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_history_covers_max_delay() {
        let props = GameProperties::default();
        assert_eq!(props.tick_gap_ms(), 50.0);
        assert_eq!(props.max_delay_ticks(), 40);
        assert!(props.wind_history_len() as u64 > props.max_delay_ticks());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let props: GameProperties =
            serde_json::from_str(r#"{ "tick_rate": 30, "cannon_ball": { "speed": 250.0 } }"#)
                .expect("valid properties json");
        assert_eq!(props.tick_rate, 30);
        assert_eq!(props.cannon_ball.speed, 250.0);
        assert_eq!(props.cannon_ball.damage, CannonBallProperties::default().damage);
        assert_eq!(props.wind, WindProperties::default());
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        let props = GameProperties {
            tick_rate: 0,
            ..GameProperties::default()
        };
        assert!(matches!(props.validate(), Err(ConfigError::PropertyOutOfRange("tick_rate"))));
    }
}
