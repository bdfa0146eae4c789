//! Skewed user population behind a cumulative-weight table.
//!
//! Each simulated user gets one activity weight drawn at construction from a
//! heavy-tailed distribution, so a minority of users absorbs a
//! disproportionate share of the traffic. The weights collapse into a
//! prefix-sum table that stays immutable for the whole run; selection is a
//! uniform draw over the grand total followed by a binary search, O(log n)
//! per pick regardless of population size.
//!
//! Weight draws come from [`rand_distr`] (log-normal and Pareto are the two
//! supported shapes) through a caller-owned generator.

use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, LogNormal, Pareto};

/// User-id namespace offset. Display ids are stable per index so the same
/// simulated user keeps one identity across a run.
const USER_ID_BASE: u64 = 90_000;

#[derive(Debug)]
pub enum Error {
    EmptyPopulation,
    NonPositiveParameter { distribution: &'static str, parameter: &'static str, value: f64 },
    InvalidWeight { index: usize, value: f64 },
    ZeroTotalWeight,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPopulation => write!(f, "population must contain at least one user"),
            Self::NonPositiveParameter { distribution, parameter, value } => {
                write!(f, "{distribution} {parameter} must be positive, got {value}")
            }
            Self::InvalidWeight { index, value } => {
                write!(f, "weight for user {index} must be finite and non-negative, got {value}")
            }
            Self::ZeroTotalWeight => write!(f, "total population weight must be positive"),
        }
    }
}

impl std::error::Error for Error {}

/// Shape of the per-user activity weight draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightDistribution {
    LogNormal { mu: f64, sigma: f64 },
    Pareto { alpha: f64, x_min: f64 },
}

impl WeightDistribution {
    fn validate(self) -> Result<(), Error> {
        match self {
            Self::LogNormal { sigma, .. } if sigma <= 0.0 => Err(Error::NonPositiveParameter {
                distribution: "log-normal",
                parameter: "sigma",
                value: sigma,
            }),
            Self::Pareto { alpha, .. } if alpha <= 0.0 => Err(Error::NonPositiveParameter {
                distribution: "pareto",
                parameter: "alpha",
                value: alpha,
            }),
            Self::Pareto { x_min, .. } if x_min <= 0.0 => Err(Error::NonPositiveParameter {
                distribution: "pareto",
                parameter: "x_min",
                value: x_min,
            }),
            _ => Ok(()),
        }
    }

    fn draw<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        match self {
            Self::LogNormal { mu, sigma } => {
                LogNormal::new(mu, sigma).expect("parameters validated").sample(rng)
            }
            Self::Pareto { alpha, x_min } => {
                Pareto::new(x_min, alpha).expect("parameters validated").sample(rng)
            }
        }
    }
}

/// Immutable prefix-sum table over per-user weights.
///
/// Invariant: the cumulative sequence is non-decreasing and its last entry
/// equals the grand total. A zero weight is legal; that user is simply
/// unreachable unless it is the sole entry.
#[derive(Debug, Clone)]
pub struct WeightTable {
    cumulative: Vec<f64>,
    total: f64,
}

impl WeightTable {
    /// Draws one weight per user from `distribution` and builds the table.
    pub fn build<R: Rng + ?Sized>(
        population: usize,
        distribution: WeightDistribution,
        rng: &mut R,
    ) -> Result<Self, Error> {
        distribution.validate()?;
        let weights: Vec<f64> = (0..population).map(|_| distribution.draw(rng)).collect();
        Self::from_weights(&weights)
    }

    /// Builds the table from explicit weights, mostly useful for tests and
    /// hand-crafted populations.
    pub fn from_weights(weights: &[f64]) -> Result<Self, Error> {
        if weights.is_empty() {
            return Err(Error::EmptyPopulation);
        }

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for (index, &weight) in weights.iter().enumerate() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::InvalidWeight { index, value: weight });
            }
            total += weight;
            cumulative.push(total);
        }

        if total <= 0.0 {
            return Err(Error::ZeroTotalWeight);
        }

        Ok(Self { cumulative, total })
    }

    /// Selects a user index proportionally to its weight.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let draw = rng.random_range(0.0..self.total);
        // First entry strictly above the draw; ties on equal prefix sums skip
        // zero-weight users.
        let index = self.cumulative.partition_point(|&c| c <= draw);
        index.min(self.cumulative.len() - 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.total
    }

    #[must_use]
    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    /// Stable display id for a user index.
    #[must_use]
    pub fn display_id(index: usize) -> String {
        format!("u_{}", USER_ID_BASE + index as u64)
    }
}
