//! CLI entrypoint and run orchestration.
//!
//! The module uses [`clap`] for argument parsing because the standard
//! library provides only raw argument iteration via `std::env::args()`. Clap
//! handles type validation, help generation, and argument conflicts
//! automatically; the duration/count exclusivity is enforced both here and
//! in config validation so file- and env-sourced settings get the same
//! check.
//!
//! Signal handling relies on [`signal_hook`] since Rust has no signal API in
//! its standard library. SIGINT and SIGTERM set the dispatcher's shutdown
//! flag, so a run ends cleanly at a batch boundary with its progress
//! summary printed. Exit codes follow the Unix convention of 128 plus the
//! signal number: 130 for SIGINT, 143 for SIGTERM, which lets process
//! supervisors distinguish graceful termination from forced kills.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{io, time};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use clap_cargo::style::CLAP_STYLING;
use lib_rushhour::dispatch::{Dispatcher, Mode, RunStats};
use lib_rushhour::event::Synthesizer;
use lib_rushhour::population::WeightTable;
use lib_rushhour::rate::RateModel;
use lib_rushhour::sampler::ArrivalSampler;
use rand::SeedableRng;
use rand::rngs::StdRng;
#[cfg(windows)]
use signal_hook::consts::signal::SIGINT;
#[cfg(unix)]
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;

use crate::config::{self, AppConfig, DistributionKind, PartialConfig, RunMode};
use crate::sink::{StdoutSink, TcpSink};

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let partial = build_partial_config(&cli);
    let app_config = config::load(partial).context("loading config")?;

    if cli.check {
        eprintln!("Config OK");
        return Ok(ExitCode::SUCCESS);
    }

    run_generator(&app_config)
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DistributionArg {
    Lognormal,
    Pareto,
}

impl From<DistributionArg> for DistributionKind {
    fn from(arg: DistributionArg) -> Self {
        match arg {
            DistributionArg::Lognormal => Self::LogNormal,
            DistributionArg::Pareto => Self::Pareto,
        }
    }
}

#[derive(Parser)]
#[command(about, version, styles = CLAP_STYLING)]
struct Cli {
    #[arg(short, long, help = "Path to TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Number of simulated users")]
    population: Option<u64>,

    #[arg(short, long, help = "Baseline events per user per minute")]
    rate: Option<f64>,

    #[arg(long, help = "Fixed events per second, bypassing the calendar model")]
    fixed_rate: Option<f64>,

    #[arg(short, long, help = "Arrival jitter ratio in [0, 1)")]
    jitter: Option<f64>,

    #[arg(long, value_enum, help = "Per-user weight distribution")]
    distribution: Option<DistributionArg>,

    #[arg(long, help = "Log-normal location parameter")]
    mu: Option<f64>,

    #[arg(long, help = "Log-normal scale parameter")]
    sigma: Option<f64>,

    #[arg(long, help = "Pareto tail index")]
    alpha: Option<f64>,

    #[arg(long, help = "Pareto minimum weight")]
    x_min: Option<f64>,

    #[arg(
        short,
        long,
        conflicts_with = "count",
        help = "Run for this wall-clock duration (e.g., 30s, 5m)"
    )]
    duration: Option<String>,

    #[arg(short = 'n', long, help = "Generate exactly this many events")]
    count: Option<u64>,

    #[arg(short, long, help = "RNG seed for reproducible runs (0 = entropy)")]
    seed: Option<u64>,

    #[arg(long, help = "Write to TCP address (e.g., 127.0.0.1:5514) instead of stdout")]
    tcp: Option<String>,

    #[arg(long, help = "Pretty-print payloads for human inspection")]
    pretty: bool,

    #[arg(long, help = "Validate configuration and exit")]
    check: bool,
}

fn build_partial_config(cli: &Cli) -> PartialConfig {
    PartialConfig {
        config_file: cli.config.clone(),
        population: cli.population,
        rate_per_user_per_minute: cli.rate,
        fixed_rate: cli.fixed_rate,
        jitter: cli.jitter,
        distribution: cli.distribution.map(DistributionKind::from),
        mu: cli.mu,
        sigma: cli.sigma,
        alpha: cli.alpha,
        x_min: cli.x_min,
        duration: cli.duration.as_deref().and_then(config::parse_duration),
        count: cli.count,
        seed: cli.seed,
        tcp: cli.tcp.clone(),
        // The flag maps to None when absent so a file-level `pretty = true`
        // survives the merge.
        pretty: if cli.pretty { Some(true) } else { None },
    }
}

#[cfg(unix)]
fn register_signals(
    shutdown: &Arc<AtomicBool>,
    sigint_flag: &Arc<AtomicBool>,
    sigterm_flag: &Arc<AtomicBool>,
) -> Result<(), io::Error> {
    // First SIGINT requests a batch-boundary stop; a second one exits
    // immediately with code 130.
    let force_exit = Arc::new(AtomicBool::new(false));

    flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&force_exit))?;
    flag::register(SIGINT, Arc::clone(&force_exit))?;
    flag::register(SIGINT, Arc::clone(sigint_flag))?;
    flag::register(SIGINT, Arc::clone(shutdown))?;

    flag::register(SIGTERM, Arc::clone(sigterm_flag))?;
    flag::register(SIGTERM, Arc::clone(shutdown))?;

    Ok(())
}

#[cfg(windows)]
fn register_signals(
    shutdown: &Arc<AtomicBool>,
    sigint_flag: &Arc<AtomicBool>,
    _sigterm_flag: &Arc<AtomicBool>,
) -> Result<(), io::Error> {
    flag::register(SIGINT, Arc::clone(sigint_flag))?;
    flag::register(SIGINT, Arc::clone(shutdown))?;
    Ok(())
}

fn describe_mode(mode: RunMode) -> String {
    match mode {
        RunMode::Duration(duration) => format!("duration {duration:?}"),
        RunMode::Count(count) => format!("count {count}"),
    }
}

fn print_summary(stats: &RunStats) {
    eprintln!("Run complete.");
    eprintln!("  Events submitted: {}", stats.events_submitted);
    eprintln!("  Batches submitted: {}", stats.batches_submitted);
    if stats.interrupted {
        eprintln!("  Stopped early by signal.");
    }
}

fn run_generator(config: &AppConfig) -> Result<ExitCode> {
    let model = RateModel::new(
        config.traffic.population,
        config.traffic.rate_per_user_per_minute,
        config.traffic.fixed_rate,
    )
    .context("building rate model")?;

    let sampler = ArrivalSampler::new(config.traffic.jitter).context("building sampler")?;
    let synthesizer = Synthesizer::new().context("building synthesizer")?;

    let mut rng = if config.run.seed == 0 {
        StdRng::from_os_rng()
    } else {
        StdRng::seed_from_u64(config.run.seed)
    };

    let population =
        WeightTable::build(config.traffic.population as usize, config.weights, &mut rng)
            .context("building population weights")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let sigint_flag = Arc::new(AtomicBool::new(false));
    let sigterm_flag = Arc::new(AtomicBool::new(false));

    register_signals(&shutdown, &sigint_flag, &sigterm_flag)
        .context("failed to register signals")?;

    let mode = match config.run.mode {
        RunMode::Duration(duration) => Mode::Duration(duration),
        RunMode::Count(count) => Mode::Count(count),
    };

    eprintln!(
        "Config: population={}, rate={}/user/min, fixed_rate={:?}, jitter={}, mode={}",
        config.traffic.population,
        config.traffic.rate_per_user_per_minute,
        config.traffic.fixed_rate,
        config.traffic.jitter,
        describe_mode(config.run.mode),
    );

    let dispatcher =
        Dispatcher::new(&model, sampler, &population, &synthesizer, config.sink.pretty, shutdown);

    let started = time::Instant::now();

    let result = match config.sink.tcp {
        Some(ref addr) => {
            let mut sink = TcpSink::connect(addr.as_str())
                .with_context(|| format!("failed to connect TCP sink {addr}"))?;
            eprintln!("Sink: tcp {addr}");
            dispatcher.run(&mut rng, &mut sink, mode)
        }
        None => {
            let mut sink = StdoutSink::new();
            eprintln!("Sink: stdout");
            dispatcher.run(&mut rng, &mut sink, mode)
        }
    };

    match result {
        Ok(stats) => {
            log::info!("run finished in {:?}", started.elapsed());
            print_summary(&stats);

            // Signal-based exit codes take precedence to accurately report
            // termination cause to process supervisors.
            if sigint_flag.load(Ordering::Relaxed) {
                return Ok(130.into());
            }
            if sigterm_flag.load(Ordering::Relaxed) {
                return Ok(143.into());
            }

            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            // Fatal by design: no retry, no partial-batch recovery. Report
            // the progress made before bailing out.
            eprintln!("Run aborted after {} events.", e.events_submitted());
            Err(anyhow::Error::new(e)).context("generation failed")
        }
    }
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
