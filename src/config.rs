//! Model parameters and the random-variate samplers that turn them into delays.
//!
//! The engine itself never draws random numbers: every delay a process asks for is a plain `f64`. This module is the
//! bridge for models that want stochastic inter-arrival or service times. An [`Interval`] describes a distribution,
//! [`Interval::sampler()`] validates it and builds an [`IntervalSampler`], and anything implementing [`Sampler`]
//! (including plain closures) can stand in for one.
//!
//! ```
//! use queuesim::config::{Interval, ModelConfig, Sampler};
//!
//! let config = ModelConfig {
//!     arrival: Interval::Exponential { mean: 5.0 },
//!     ..ModelConfig::default()
//! };
//! config.validate().unwrap();
//!
//! let mut rng = config.rng();
//! let mut arrivals = config.arrival.sampler().unwrap();
//! assert!(arrivals.sample(&mut rng) >= 0.0);
//! ```

use crate::Error;

use rand::distr::Uniform;
use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, Exp};
use rand_pcg::Pcg64;

/// Source of nonnegative delays, e.g. the time between two arrivals.
pub trait Sampler {
    /// Draw the next delay.
    fn sample(&mut self, rng: &mut dyn RngCore) -> f64;
}

impl<F> Sampler for F
where
    F: FnMut(&mut dyn RngCore) -> f64,
{
    fn sample(&mut self, rng: &mut dyn RngCore) -> f64 {
        self(rng)
    }
}

/// A distribution of delays.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Interval {
    /// Always the same delay.
    Fixed(f64),
    /// Exponentially distributed delays, as between the arrivals of a Poisson process.
    Exponential { mean: f64 },
    /// Delays drawn uniformly from `[low, high)`.
    Uniform { low: f64, high: f64 },
}

impl Interval {
    /// Expected value of the distribution.
    pub fn mean(&self) -> f64 {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { mean } => mean,
            Self::Uniform { low, high } => (low + high) / 2.0,
        }
    }

    /// Check that every delay the distribution can produce is finite and nonnegative.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] describing the offending parameter.
    pub fn validate(&self) -> crate::Result {
        let valid = match *self {
            Self::Fixed(delay) => delay >= 0.0 && delay.is_finite(),
            Self::Exponential { mean } => mean > 0.0 && mean.is_finite(),
            Self::Uniform { low, high } => low >= 0.0 && low < high && high.is_finite(),
        };

        if valid {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!("{self:?} cannot produce finite, nonnegative delays")))
        }
    }

    /// Build a sampler for this distribution.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the parameters fail [`validate()`](Interval::validate).
    pub fn sampler(&self) -> crate::Result<IntervalSampler> {
        self.validate()?;
        let invalid = |error: &dyn std::fmt::Display| Error::InvalidConfig(format!("{self:?}: {error}"));

        Ok(match *self {
            Self::Fixed(delay) => IntervalSampler::Fixed(delay),
            Self::Exponential { mean } => IntervalSampler::Exponential(Exp::new(1.0 / mean).map_err(|e| invalid(&e))?),
            Self::Uniform { low, high } => IntervalSampler::Uniform(Uniform::new(low, high).map_err(|e| invalid(&e))?),
        })
    }
}

/// A validated [`Interval`], ready to draw from.
#[derive(Debug, Clone)]
pub enum IntervalSampler {
    /// Always returns the same delay.
    Fixed(f64),
    /// Exponential with rate `1 / mean`.
    Exponential(Exp<f64>),
    /// Uniform over `[low, high)`.
    Uniform(Uniform<f64>),
}

impl Sampler for IntervalSampler {
    fn sample(&mut self, rng: &mut dyn RngCore) -> f64 {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential(distribution) => distribution.sample(rng),
            Self::Uniform(distribution) => distribution.sample(rng),
        }
    }
}

/// Parameters shared by the queueing models built on this crate.
///
/// Not every model uses every field: a clinic needs `capacity` and `service` but no window, while a rate limiter needs
/// `window_size` and `max_threshold` but no servers. The defaults describe a rate limiter admitting 500 requests per
/// minute against a little over 8 arriving per second, run for one hour.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct ModelConfig {
    /// Virtual time at which a run is cut off.
    pub horizon: f64,
    /// Units of the contended resource, e.g. nurses on shift.
    pub capacity: usize,
    /// Length of each rate-limiting window.
    pub window_size: f64,
    /// Most items admitted per window.
    pub max_threshold: usize,
    /// Time between arrivals.
    pub arrival: Interval,
    /// Time a unit of the resource is held per visit.
    pub service: Interval,
    /// Seed for the random-number generator of the first run.
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            horizon: 3600.0,
            capacity: 1,
            window_size: 60.0,
            max_threshold: 500,
            arrival: Interval::Fixed(0.12),
            service: Interval::Exponential { mean: 6.0 },
            seed: 0x5eed,
        }
    }
}

impl ModelConfig {
    /// Check every field.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] for a bad horizon or interval, [`Error::InvalidCapacity`] for a zero capacity or
    /// threshold or a window size that is not positive and finite.
    pub fn validate(&self) -> crate::Result {
        if !(self.horizon > 0.0) {
            return Err(Error::InvalidConfig(format!("horizon must be positive, got {}", self.horizon)));
        }
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(String::from("capacity must be at least one unit")));
        }
        if !(self.window_size > 0.0) || self.window_size.is_infinite() {
            return Err(Error::InvalidCapacity(format!(
                "window size must be positive and finite, got {}",
                self.window_size
            )));
        }
        if self.max_threshold == 0 {
            return Err(Error::InvalidCapacity(String::from("threshold must be at least one item")));
        }
        self.arrival.validate()?;
        self.service.validate()
    }

    /// A generator seeded from [`seed`](ModelConfig::seed).
    pub fn rng(&self) -> Pcg64 {
        Pcg64::seed_from_u64(self.seed)
    }

    /// A generator for the given replication. Replication zero matches [`rng()`](ModelConfig::rng); the others get
    /// independent, reproducible streams.
    pub fn rng_for_run(&self, run: u64) -> Pcg64 {
        Pcg64::seed_from_u64(self.seed.wrapping_add(run))
    }
}
