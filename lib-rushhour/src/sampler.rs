//! Jittered Poisson arrival sampling.
//!
//! One sample turns an expected rate into the concrete event count for a
//! slice: a uniform jitter factor widens the spread beyond pure Poisson
//! noise, then a Poisson draw with the jittered mean produces the count.
//! Small means use the multiplicative-threshold algorithm (a running product
//! of uniform draws against `exp(-mean)`); large means switch to the normal
//! approximation N(mean, mean), which avoids a draw per arrival.
//!
//! Every draw goes through a caller-owned [`rand::Rng`], so a seeded run
//! reproduces its arrival sequence exactly.

use std::fmt;

use rand::Rng;
use rand_distr::StandardNormal;

/// Above this mean the multiplicative algorithm needs too many uniform draws
/// per sample and the normal approximation is statistically safe.
const NORMAL_APPROX_THRESHOLD: f64 = 30.0;

#[derive(Debug)]
pub enum Error {
    JitterOutOfRange(f64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JitterOutOfRange(v) => {
                write!(f, "jitter ratio must be in [0, 1), got {v}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone, Copy)]
pub struct ArrivalSampler {
    jitter_ratio: f64,
}

impl ArrivalSampler {
    pub fn new(jitter_ratio: f64) -> Result<Self, Error> {
        if !(0.0..1.0).contains(&jitter_ratio) {
            return Err(Error::JitterOutOfRange(jitter_ratio));
        }
        Ok(Self { jitter_ratio })
    }

    /// Event count for one slice with `expected` mean arrivals.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, expected: f64) -> u64 {
        if expected <= 0.0 {
            return 0;
        }

        let factor = rng.random_range(1.0 - self.jitter_ratio..=1.0 + self.jitter_ratio);
        poisson(rng, expected * factor)
    }
}

/// Poisson draw with the given mean. Non-positive means deterministically
/// return 0.
pub fn poisson<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> u64 {
    if mean <= 0.0 {
        return 0;
    }

    if mean > NORMAL_APPROX_THRESHOLD {
        let z: f64 = rng.sample(StandardNormal);
        let approx = mean + z * mean.sqrt();
        return approx.round().max(0.0) as u64;
    }

    let threshold = (-mean).exp();
    let mut product: f64 = rng.random();
    let mut count = 0;
    while product > threshold {
        count += 1;
        product *= rng.random::<f64>();
    }
    count
}
