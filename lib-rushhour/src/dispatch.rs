//! Generation loop: batches synthesized events into a sink.
//!
//! A single thread drives the whole loop. Each iteration asks the rate model
//! for the expected rate at the current wall-clock time (re-evaluated every
//! slice, never cached), the arrival sampler for a count, the population
//! table for user identities, and the synthesizer for payloads, then submits
//! the batch synchronously. The only blocking operations are the per-slice
//! sleep in duration mode and the submit call itself.
//!
//! Any sink or encoding failure is fatal and aborts the run with the
//! progress made so far — a load generator's job is to produce traffic, not
//! to guarantee delivery, so there is no retry or buffering. A shared
//! shutdown flag is observed at batch boundaries for a clean early stop.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use jiff::tz::TimeZone;
use rand::Rng;

use crate::event::{self, Synthesizer};
use crate::helpers::SLICE_SECS;
use crate::population::WeightTable;
use crate::rate::RateModel;
use crate::sampler::{self, ArrivalSampler};

const SLICE_PERIOD: Duration = Duration::from_secs(SLICE_SECS);

/// Batched-write contract the generator drives. Payloads are opaque to the
/// sink; order within a batch is preserved.
pub trait Sink {
    fn submit(&mut self, batch: &[Vec<u8>]) -> io::Result<()>;
}

/// Termination condition for one run. The two modes are mutually exclusive
/// by construction.
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    /// Slice-paced generation until the wall-clock deadline.
    Duration(Duration),
    /// Back-to-back batches until exactly this many events are submitted.
    Count(u64),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub events_submitted: u64,
    pub batches_submitted: u64,
    /// True when the shutdown flag ended the run before its natural
    /// deadline or target.
    pub interrupted: bool,
}

/// Fatal run failures carry the progress made so far, so the caller can
/// report it before exiting.
#[derive(Debug)]
pub enum Error {
    Sink { submitted: u64, source: io::Error },
    Encode { submitted: u64, source: serde_json::Error },
}

impl Error {
    #[must_use]
    pub fn events_submitted(&self) -> u64 {
        match self {
            Self::Sink { submitted, .. } | Self::Encode { submitted, .. } => *submitted,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sink { submitted, source } => {
                write!(f, "sink rejected batch after {submitted} events: {source}")
            }
            Self::Encode { submitted, source } => {
                write!(f, "record failed to encode after {submitted} events: {source}")
            }
        }
    }
}

impl std::error::Error for Error {}

pub struct Dispatcher<'a> {
    model: &'a RateModel,
    sampler: ArrivalSampler,
    population: &'a WeightTable,
    synthesizer: &'a Synthesizer,
    pretty: bool,
    shutdown: Arc<AtomicBool>,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(
        model: &'a RateModel,
        sampler: ArrivalSampler,
        population: &'a WeightTable,
        synthesizer: &'a Synthesizer,
        pretty: bool,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self { model, sampler, population, synthesizer, pretty, shutdown }
    }

    pub fn run<R, S>(&self, rng: &mut R, sink: &mut S, mode: Mode) -> Result<RunStats, Error>
    where
        R: Rng + ?Sized,
        S: Sink,
    {
        match mode {
            Mode::Duration(duration) => self.run_for_duration(rng, sink, duration),
            Mode::Count(target) => self.run_for_count(rng, sink, target),
        }
    }

    fn run_for_duration<R, S>(
        &self,
        rng: &mut R,
        sink: &mut S,
        duration: Duration,
    ) -> Result<RunStats, Error>
    where
        R: Rng + ?Sized,
        S: Sink,
    {
        let mut stats = RunStats::default();
        let deadline = Instant::now() + duration;

        while Instant::now() < deadline {
            if self.shutdown.load(Ordering::Relaxed) {
                stats.interrupted = true;
                break;
            }

            let slice_start = Instant::now();
            let now = Timestamp::now();
            let rate = self.model.expected_rate(&now.to_zoned(TimeZone::UTC));
            let count = self.sampler.sample(rng, rate);

            log::debug!("slice: expected_rate={rate:.3} sampled_count={count}");

            if count > 0 {
                let batch = self.build_batch(rng, count, now, &stats)?;
                submit(sink, &batch, &mut stats)?;
            }

            // Sleeping out the remainder keeps slices aligned to the period;
            // a slice that overran its budget starts the next one
            // immediately.
            if let Some(remaining) = SLICE_PERIOD.checked_sub(slice_start.elapsed()) {
                thread::sleep(remaining);
            }
        }

        Ok(stats)
    }

    fn run_for_count<R, S>(&self, rng: &mut R, sink: &mut S, target: u64) -> Result<RunStats, Error>
    where
        R: Rng + ?Sized,
        S: Sink,
    {
        let mut stats = RunStats::default();

        while stats.events_submitted < target {
            if self.shutdown.load(Ordering::Relaxed) {
                stats.interrupted = true;
                break;
            }

            let now = Timestamp::now();
            let rate = self.model.expected_rate(&now.to_zoned(TimeZone::UTC));

            // Batches follow the arrival process but never overshoot the
            // target; the rate floor keeps progress even when the model
            // says the site is asleep.
            let remaining = target - stats.events_submitted;
            let size = sampler::poisson(rng, rate.max(1.0)).max(1).min(remaining);

            let batch = self.build_batch(rng, size, now, &stats)?;
            submit(sink, &batch, &mut stats)?;
        }

        Ok(stats)
    }

    fn build_batch<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: u64,
        now: Timestamp,
        stats: &RunStats,
    ) -> Result<Vec<Vec<u8>>, Error> {
        let mut batch = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let user = self.population.pick(rng);
            let record = self.synthesizer.synthesize(rng, &WeightTable::display_id(user), now);
            let payload = event::encode(&record, self.pretty).map_err(|source| Error::Encode {
                submitted: stats.events_submitted,
                source,
            })?;
            batch.push(payload);
        }
        Ok(batch)
    }
}

fn submit<S: Sink>(sink: &mut S, batch: &[Vec<u8>], stats: &mut RunStats) -> Result<(), Error> {
    sink.submit(batch)
        .map_err(|source| Error::Sink { submitted: stats.events_submitted, source })?;
    stats.events_submitted += batch.len() as u64;
    stats.batches_submitted += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::population::WeightDistribution;

    use super::*;

    struct CollectingSink {
        batches: Vec<usize>,
        payloads: Vec<Vec<u8>>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self { batches: Vec::new(), payloads: Vec::new() }
        }
    }

    impl Sink for CollectingSink {
        fn submit(&mut self, batch: &[Vec<u8>]) -> io::Result<()> {
            self.batches.push(batch.len());
            self.payloads.extend(batch.iter().cloned());
            Ok(())
        }
    }

    /// Fails every submit, to exercise the fatal path.
    struct RejectingSink;

    impl Sink for RejectingSink {
        fn submit(&mut self, _batch: &[Vec<u8>]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "broker gone"))
        }
    }

    struct Fixture {
        model: RateModel,
        population: WeightTable,
        synthesizer: Synthesizer,
    }

    impl Fixture {
        fn new(population: usize, fixed_rate: f64) -> Self {
            let mut rng = StdRng::seed_from_u64(99);
            Self {
                model: RateModel::new(population as u64, 1.0, Some(fixed_rate)).unwrap(),
                population: WeightTable::build(
                    population,
                    WeightDistribution::LogNormal { mu: 0.0, sigma: 1.0 },
                    &mut rng,
                )
                .unwrap(),
                synthesizer: Synthesizer::new().unwrap(),
            }
        }

        fn dispatcher(&self) -> Dispatcher<'_> {
            Dispatcher::new(
                &self.model,
                ArrivalSampler::new(0.2).unwrap(),
                &self.population,
                &self.synthesizer,
                false,
                Arc::new(AtomicBool::new(false)),
            )
        }
    }

    #[test]
    fn test_count_mode_hits_target_exactly() {
        for target in [1u64, 7, 100, 1_234] {
            let fixture = Fixture::new(20, 50.0);
            let mut rng = StdRng::seed_from_u64(target);
            let mut sink = CollectingSink::new();

            let stats =
                fixture.dispatcher().run(&mut rng, &mut sink, Mode::Count(target)).unwrap();

            assert_eq!(stats.events_submitted, target);
            assert_eq!(sink.payloads.len() as u64, target);
            assert_eq!(stats.batches_submitted as usize, sink.batches.len());
            assert!(!stats.interrupted);
        }
    }

    #[test]
    fn test_count_mode_batches_never_overshoot() {
        let fixture = Fixture::new(10, 80.0);
        let mut rng = StdRng::seed_from_u64(42);
        let mut sink = CollectingSink::new();

        fixture.dispatcher().run(&mut rng, &mut sink, Mode::Count(25)).unwrap();

        let total: usize = sink.batches.iter().sum();
        assert_eq!(total, 25);
        assert!(sink.batches.iter().all(|&len| len >= 1));
    }

    #[test]
    fn test_duration_mode_terminates_near_deadline() {
        let fixture = Fixture::new(5, 3.0);
        let mut rng = StdRng::seed_from_u64(1);
        let mut sink = CollectingSink::new();

        let started = Instant::now();
        let stats = fixture
            .dispatcher()
            .run(&mut rng, &mut sink, Mode::Duration(Duration::from_millis(1_500)))
            .unwrap();
        let elapsed = started.elapsed();

        // Termination within one slice period of the deadline.
        assert!(elapsed < Duration::from_millis(1_500) + SLICE_PERIOD);
        assert_eq!(
            stats.events_submitted,
            sink.payloads.len() as u64,
            "stats must match delivered payloads"
        );
    }

    #[test]
    fn test_sink_failure_is_fatal_and_reports_progress() {
        let fixture = Fixture::new(5, 10.0);
        let mut rng = StdRng::seed_from_u64(2);
        let mut sink = RejectingSink;

        let err = fixture.dispatcher().run(&mut rng, &mut sink, Mode::Count(50)).unwrap_err();

        match err {
            Error::Sink { submitted, .. } => assert_eq!(submitted, 0),
            Error::Encode { .. } => panic!("expected sink error"),
        }
    }

    #[test]
    fn test_shutdown_flag_stops_count_mode() {
        let fixture = Fixture::new(5, 10.0);
        let shutdown = Arc::new(AtomicBool::new(true));
        let dispatcher = Dispatcher::new(
            &fixture.model,
            ArrivalSampler::new(0.0).unwrap(),
            &fixture.population,
            &fixture.synthesizer,
            false,
            shutdown,
        );
        let mut rng = StdRng::seed_from_u64(3);
        let mut sink = CollectingSink::new();

        let stats = dispatcher.run(&mut rng, &mut sink, Mode::Count(1_000)).unwrap();

        assert!(stats.interrupted);
        assert_eq!(stats.events_submitted, 0);
    }

    #[test]
    fn test_payloads_are_valid_records() {
        let fixture = Fixture::new(3, 20.0);
        let mut rng = StdRng::seed_from_u64(4);
        let mut sink = CollectingSink::new();

        fixture.dispatcher().run(&mut rng, &mut sink, Mode::Count(40)).unwrap();

        for payload in &sink.payloads {
            let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
            let event = value["event_time"].as_str().unwrap().to_owned();
            let ingest = value["ingest_time"].as_str().unwrap().to_owned();
            assert!(ingest >= event, "ingest {ingest} before event {event}");
            assert!(value["user_id"].as_str().unwrap().is_empty()
                || value["user_id"].as_str().unwrap().starts_with("u_9"));
        }
    }
}
