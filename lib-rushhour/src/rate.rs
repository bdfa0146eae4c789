//! Arrival-rate model over wall-clock time.
//!
//! The expected per-slice rate is a pure function of the clock and static
//! configuration: population size times a baseline per-user-per-minute rate,
//! shaped by an hour-of-day multiplier table and a scheduled spike window,
//! divided down to the slice period. Callers re-evaluate the model on every
//! slice, so a run that crosses an hour boundary picks up the new multiplier
//! mid-run instead of freezing the curve at startup.
//!
//! The module uses [`jiff`] civil time for the hour and weekday lookups
//! because the standard library has no calendar API.

use std::fmt;

use jiff::Zoned;
use jiff::civil::Weekday;

use crate::helpers::SECS_PER_MINUTE;

/// Relative traffic intensity per hour of day, UTC. Overnight hours carry a
/// fraction of the daytime load and the curve peaks in the evening.
pub const HOUR_MULTIPLIERS: [f64; 24] = [
    0.20, 0.15, 0.10, 0.10, 0.10, 0.15, // 00-05 overnight trough
    0.30, 0.50, 0.70, 0.90, 1.00, 1.10, // 06-11 morning ramp
    1.20, 1.10, 1.00, 1.00, 1.10, 1.30, // 12-17 daytime plateau
    1.50, 1.70, 1.80, 1.60, 1.00, 0.50, // 18-23 evening peak and falloff
];

const DEFAULT_SPIKE_MULTIPLIER: f64 = 3.0;

#[derive(Debug)]
pub enum Error {
    NonPositiveBaseline(f64),
    NonPositiveFixedRate(f64),
    NonPositiveMultiplier { hour: usize, value: f64 },
    SpikeHourOutOfRange(i8),
    NonPositiveSpikeMultiplier(f64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveBaseline(v) => {
                write!(f, "baseline per-user rate must be positive, got {v}")
            }
            Self::NonPositiveFixedRate(v) => write!(f, "fixed rate must be positive, got {v}"),
            Self::NonPositiveMultiplier { hour, value } => {
                write!(f, "hour multiplier for hour {hour} must be positive, got {value}")
            }
            Self::SpikeHourOutOfRange(h) => write!(f, "spike hour must be in 0..24, got {h}"),
            Self::NonPositiveSpikeMultiplier(v) => {
                write!(f, "spike multiplier must be positive, got {v}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// One scheduled boost window: inside the given weekday and hour the steady
/// rate is multiplied, everywhere else it passes through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct SpikeWindow {
    pub weekday: Weekday,
    pub hour: i8,
    pub multiplier: f64,
}

impl Default for SpikeWindow {
    // Friday evening rush: the default window sits on the busiest point of
    // the hour curve so spike behavior shows up in short demo runs.
    fn default() -> Self {
        Self { weekday: Weekday::Friday, hour: 20, multiplier: DEFAULT_SPIKE_MULTIPLIER }
    }
}

#[derive(Debug, Clone)]
pub struct RateModel {
    population: u64,
    per_user_per_minute: f64,
    fixed_rate: Option<f64>,
    hour_multipliers: [f64; 24],
    spike: SpikeWindow,
}

impl RateModel {
    pub fn new(
        population: u64,
        per_user_per_minute: f64,
        fixed_rate: Option<f64>,
    ) -> Result<Self, Error> {
        Self::with_tables(population, per_user_per_minute, fixed_rate, HOUR_MULTIPLIERS, SpikeWindow::default())
    }

    pub fn with_tables(
        population: u64,
        per_user_per_minute: f64,
        fixed_rate: Option<f64>,
        hour_multipliers: [f64; 24],
        spike: SpikeWindow,
    ) -> Result<Self, Error> {
        if per_user_per_minute <= 0.0 {
            return Err(Error::NonPositiveBaseline(per_user_per_minute));
        }
        if let Some(rate) = fixed_rate
            && rate <= 0.0
        {
            return Err(Error::NonPositiveFixedRate(rate));
        }
        for (hour, &value) in hour_multipliers.iter().enumerate() {
            if value <= 0.0 {
                return Err(Error::NonPositiveMultiplier { hour, value });
            }
        }
        if !(0..24).contains(&spike.hour) {
            return Err(Error::SpikeHourOutOfRange(spike.hour));
        }
        if spike.multiplier <= 0.0 {
            return Err(Error::NonPositiveSpikeMultiplier(spike.multiplier));
        }

        Ok(Self { population, per_user_per_minute, fixed_rate, hour_multipliers, spike })
    }

    /// Expected events for the slice containing `now`. A configured fixed
    /// rate bypasses the model entirely.
    #[must_use]
    pub fn expected_rate(&self, now: &Zoned) -> f64 {
        if let Some(rate) = self.fixed_rate {
            return rate;
        }

        let hour = now.hour();
        let per_minute = self.population as f64
            * self.per_user_per_minute
            * self.hour_multipliers[hour as usize]
            * self.spike_multiplier(now.weekday(), hour);

        per_minute / SECS_PER_MINUTE
    }

    fn spike_multiplier(&self, weekday: Weekday, hour: i8) -> f64 {
        if weekday == self.spike.weekday && hour == self.spike.hour {
            self.spike.multiplier
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use jiff::tz::TimeZone;

    use super::*;

    fn at(year: i16, month: i8, day: i8, hour: i8) -> Zoned {
        date(year, month, day).at(hour, 30, 0, 0).to_zoned(TimeZone::UTC).unwrap()
    }

    const FLAT: [f64; 24] = [1.0; 24];

    #[test]
    fn test_fixed_rate_bypasses_model() {
        let model = RateModel::new(1_000, 2.0, Some(42.5)).unwrap();
        // 2024-04-05 is a Friday, inside the default spike window.
        assert_eq!(model.expected_rate(&at(2024, 4, 5, 20)), 42.5);
        assert_eq!(model.expected_rate(&at(2024, 4, 8, 3)), 42.5);
    }

    #[test]
    fn test_steady_rate_formula() {
        let spike = SpikeWindow { weekday: Weekday::Friday, hour: 20, multiplier: 3.0 };
        let model = RateModel::with_tables(600, 2.0, None, FLAT, spike).unwrap();
        // Monday 10:00, flat table, outside the spike: 600 * 2 / 60 = 20.
        let rate = model.expected_rate(&at(2024, 4, 8, 10));
        assert!((rate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_spike_window_applies_inside_only() {
        let spike = SpikeWindow { weekday: Weekday::Friday, hour: 20, multiplier: 3.0 };
        let model = RateModel::with_tables(600, 2.0, None, FLAT, spike).unwrap();

        let inside = model.expected_rate(&at(2024, 4, 5, 20));
        let same_day_other_hour = model.expected_rate(&at(2024, 4, 5, 19));
        let other_day_same_hour = model.expected_rate(&at(2024, 4, 6, 20));

        assert!((inside - 60.0).abs() < 1e-9);
        assert!((same_day_other_hour - 20.0).abs() < 1e-9);
        assert!((other_day_same_hour - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_hour_boundary_changes_rate() {
        let model = RateModel::new(600, 1.0, None).unwrap();
        // Consecutive hours on a Monday read different table entries, so a
        // per-slice re-evaluation must observe the change.
        let overnight = model.expected_rate(&at(2024, 4, 8, 3));
        let evening = model.expected_rate(&at(2024, 4, 8, 20));
        assert!(evening > overnight);
        assert!((overnight - 600.0 * HOUR_MULTIPLIERS[3] / 60.0).abs() < 1e-9);
        assert!((evening - 600.0 * HOUR_MULTIPLIERS[20] / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_table_is_all_positive() {
        assert!(HOUR_MULTIPLIERS.iter().all(|&m| m > 0.0));
    }

    #[test]
    fn test_rejects_non_positive_baseline() {
        let err = RateModel::new(100, 0.0, None).unwrap_err();
        assert!(matches!(err, Error::NonPositiveBaseline(_)));
    }

    #[test]
    fn test_rejects_non_positive_fixed_rate() {
        let err = RateModel::new(100, 1.0, Some(-1.0)).unwrap_err();
        assert!(matches!(err, Error::NonPositiveFixedRate(_)));
    }

    #[test]
    fn test_rejects_zero_hour_multiplier() {
        let mut table = FLAT;
        table[7] = 0.0;
        let err =
            RateModel::with_tables(100, 1.0, None, table, SpikeWindow::default()).unwrap_err();
        assert!(matches!(err, Error::NonPositiveMultiplier { hour: 7, .. }));
    }

    #[test]
    fn test_rejects_spike_hour_out_of_range() {
        let spike = SpikeWindow { weekday: Weekday::Monday, hour: 24, multiplier: 2.0 };
        let err = RateModel::with_tables(100, 1.0, None, FLAT, spike).unwrap_err();
        assert!(matches!(err, Error::SpikeHourOutOfRange(24)));
    }

    #[test]
    fn test_zero_population_rate_is_zero() {
        let model = RateModel::new(0, 1.0, None).unwrap();
        assert_eq!(model.expected_rate(&at(2024, 4, 8, 10)), 0.0);
    }
}
