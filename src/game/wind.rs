//! Seeded randomizer and the wind model
//!
//! Wind is advanced exactly once per tick from a seeded ChaCha stream, so a
//! seed and a tick count fully determine it. Every tick's sample is kept in a
//! bounded history for catch-up replays.

use std::collections::VecDeque;
use std::f64::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::WindProperties;

use super::Tick;

/// Reproducible pseudo-random source shared by wind and bot noise
#[derive(Debug, Clone)]
pub struct SeededRandom {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn reset_with_new_seed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// Uniform value in `[0, 1)`
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform value in `[-spread, spread]`; zero spread yields zero
    pub fn symmetric(&mut self, spread: f64) -> f64 {
        if spread <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-spread..=spread)
    }
}

/// Wind at one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub tick: Tick,
    pub magnitude: f64,
    /// Radians in `[0, 2π)`
    pub direction: f64,
}

impl WindSample {
    /// Still air, used where no wind applies
    pub fn calm(tick: Tick) -> Self {
        Self {
            tick,
            magnitude: 0.0,
            direction: 0.0,
        }
    }

    pub fn xa(&self) -> f64 {
        self.magnitude * self.direction.cos()
    }

    pub fn ya(&self) -> f64 {
        self.magnitude * self.direction.sin()
    }
}

/// The evolving wind of one session
#[derive(Debug, Clone)]
pub struct Wind {
    props: WindProperties,
    random: SeededRandom,
    magnitude: f64,
    direction: f64,
}

impl Wind {
    pub fn new(props: WindProperties, seed: u64) -> Self {
        let mut random = SeededRandom::new(seed);
        let direction = random.next_f64() * TAU;
        Self {
            magnitude: props.initial_magnitude.clamp(0.0, props.max_magnitude),
            props,
            random,
            direction,
        }
    }

    /// Restart the trajectory from `seed`; identical seeds give identical winds
    pub fn reset_with_new_seed(&mut self, seed: u64) {
        *self = Self::new(self.props.clone(), seed);
    }

    /// Advance one tick by a bounded random delta
    pub fn tick(&mut self) {
        let magnitude_delta = self.random.symmetric(self.props.magnitude_step);
        let direction_delta = self.random.symmetric(self.props.direction_step);
        self.magnitude = (self.magnitude + magnitude_delta).clamp(0.0, self.props.max_magnitude);
        self.direction = (self.direction + direction_delta).rem_euclid(TAU);
    }

    /// Advance `ticks` times without recording samples
    pub fn fast_forward(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn direction(&self) -> f64 {
        self.direction
    }

    pub fn seed(&self) -> u64 {
        self.random.seed()
    }

    pub fn sample(&self, tick: Tick) -> WindSample {
        WindSample {
            tick,
            magnitude: self.magnitude,
            direction: self.direction,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WindHistoryError {
    #[error("wind sample for tick {got} recorded after tick {last}")]
    NonMonotonic { last: Tick, got: Tick },

    #[error("wind sample for tick {got} skips ahead of tick {expected}")]
    Gap { expected: Tick, got: Tick },
}

/// Bounded, strictly increasing record of one sample per tick
#[derive(Debug, Clone)]
pub struct WindHistory {
    samples: VecDeque<WindSample>,
    capacity: usize,
}

impl WindHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append the sample for the next tick, evicting the oldest past capacity
    pub fn record(&mut self, sample: WindSample) -> Result<(), WindHistoryError> {
        if let Some(last) = self.samples.back() {
            if sample.tick <= last.tick {
                return Err(WindHistoryError::NonMonotonic {
                    last: last.tick,
                    got: sample.tick,
                });
            }
            if sample.tick != last.tick + 1 {
                return Err(WindHistoryError::Gap {
                    expected: last.tick + 1,
                    got: sample.tick,
                });
            }
        }
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        Ok(())
    }

    /// Sample recorded at `tick`, if still retained
    pub fn get(&self, tick: Tick) -> Option<&WindSample> {
        let first = self.samples.front()?.tick;
        let index = tick.checked_sub(first)?;
        self.samples.get(index as usize)
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.samples.front().map(|s| s.tick)
    }

    pub fn latest(&self) -> Option<&WindSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
