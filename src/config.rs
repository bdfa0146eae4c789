//! Three-layer configuration for the generator.
//!
//! The module implements CLI > environment > file precedence because this
//! ordering matches the 12-factor app pattern and allows scripted load runs
//! to override file-based defaults without editing them. A manual
//! implementation using `serde` and `toml` keeps the dependency footprint
//! smaller than full frameworks like `figment` or `config-rs`.
//!
//! Configuration flows through a [`PartialConfig`] intermediate where all
//! fields are optional. Each layer contributes only the values it specifies,
//! and the final merge produces an [`AppConfig`] with validated, required
//! fields. The TOML schema uses `deny_unknown_fields` to reject typos rather
//! than silently ignoring them. Every validation failure names the offending
//! field, and all of them fire before a single event is generated.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fmt, fs, io};

use lib_rushhour::{WeightDistribution, map_err};
use serde::Deserialize;

const ENV_PREFIX: &str = "RUSHHOUR_";
const CONFIG_FILE_NAME: &str = "rushhour.toml";

const DEFAULT_POPULATION: u64 = 500;
const DEFAULT_RATE_PER_USER_PER_MINUTE: f64 = 1.0;
const DEFAULT_JITTER: f64 = 0.2;
const DEFAULT_LOGNORMAL_MU: f64 = 0.0;
const DEFAULT_LOGNORMAL_SIGMA: f64 = 1.0;
const DEFAULT_PARETO_ALPHA: f64 = 1.5;
const DEFAULT_PARETO_X_MIN: f64 = 1.0;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Parse(toml::de::Error),
    Validation(ValidationError),
}

#[derive(Debug)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

map_err!(Io, io::Error);
map_err!(Parse, toml::de::Error);
map_err!(Validation, ValidationError);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Parse(e) => e.fmt(f),
            Self::Validation(e) => write!(f, "{}: {}", e.field, e.message),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    traffic: Option<TomlTrafficConfig>,
    weights: Option<TomlWeightsConfig>,
    run: Option<TomlRunConfig>,
    sink: Option<TomlSinkConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlTrafficConfig {
    population: Option<u64>,
    rate_per_user_per_minute: Option<f64>,
    fixed_rate: Option<f64>,
    jitter: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlWeightsConfig {
    distribution: Option<String>,
    mu: Option<f64>,
    sigma: Option<f64>,
    alpha: Option<f64>,
    x_min: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlRunConfig {
    duration: Option<String>,
    count: Option<u64>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlSinkConfig {
    tcp: Option<String>,
    pretty: Option<bool>,
}

impl From<TomlConfig> for PartialConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(traffic) = toml.traffic {
            config.population = traffic.population;
            config.rate_per_user_per_minute = traffic.rate_per_user_per_minute;
            config.fixed_rate = traffic.fixed_rate;
            config.jitter = traffic.jitter;
        }

        if let Some(weights) = toml.weights {
            config.distribution = weights.distribution.as_deref().and_then(parse_distribution);
            config.mu = weights.mu;
            config.sigma = weights.sigma;
            config.alpha = weights.alpha;
            config.x_min = weights.x_min;
        }

        if let Some(run) = toml.run {
            config.duration = run.duration.as_deref().and_then(parse_duration);
            config.count = run.count;
            config.seed = run.seed;
        }

        if let Some(sink) = toml.sink {
            config.tcp = sink.tcp;
            config.pretty = sink.pretty;
        }

        config
    }
}

/// Which heavy-tail shape draws the per-user weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistributionKind {
    #[default]
    LogNormal,
    Pareto,
}

#[derive(Debug, Clone)]
pub struct TrafficConfig {
    pub population: u64,
    pub rate_per_user_per_minute: f64,
    pub fixed_rate: Option<f64>,
    pub jitter: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            population: DEFAULT_POPULATION,
            rate_per_user_per_minute: DEFAULT_RATE_PER_USER_PER_MINUTE,
            fixed_rate: None,
            jitter: DEFAULT_JITTER,
        }
    }
}

/// Exactly one termination condition per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Duration(Duration),
    Count(u64),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub seed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SinkConfig {
    /// Address of a newline-delimited TCP sink; stdout when absent.
    pub tcp: Option<String>,
    pub pretty: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub traffic: TrafficConfig,
    pub weights: WeightDistribution,
    pub run: RunConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Default)]
pub struct PartialConfig {
    pub config_file: Option<PathBuf>,
    pub population: Option<u64>,
    pub rate_per_user_per_minute: Option<f64>,
    pub fixed_rate: Option<f64>,
    pub jitter: Option<f64>,
    pub distribution: Option<DistributionKind>,
    pub mu: Option<f64>,
    pub sigma: Option<f64>,
    pub alpha: Option<f64>,
    pub x_min: Option<f64>,
    pub duration: Option<Duration>,
    pub count: Option<u64>,
    pub seed: Option<u64>,
    pub tcp: Option<String>,
    pub pretty: Option<bool>,
}

impl PartialConfig {
    fn merge_from(&mut self, other: Self) {
        if other.config_file.is_some() {
            self.config_file = other.config_file;
        }
        if other.population.is_some() {
            self.population = other.population;
        }
        if other.rate_per_user_per_minute.is_some() {
            self.rate_per_user_per_minute = other.rate_per_user_per_minute;
        }
        if other.fixed_rate.is_some() {
            self.fixed_rate = other.fixed_rate;
        }
        if other.jitter.is_some() {
            self.jitter = other.jitter;
        }
        if other.distribution.is_some() {
            self.distribution = other.distribution;
        }
        if other.mu.is_some() {
            self.mu = other.mu;
        }
        if other.sigma.is_some() {
            self.sigma = other.sigma;
        }
        if other.alpha.is_some() {
            self.alpha = other.alpha;
        }
        if other.x_min.is_some() {
            self.x_min = other.x_min;
        }
        // The termination mode moves between layers as a unit, so a CLI
        // --count cleanly replaces a file-level duration instead of
        // colliding with it.
        if other.duration.is_some() || other.count.is_some() {
            self.duration = other.duration;
            self.count = other.count;
        }
        if other.seed.is_some() {
            self.seed = other.seed;
        }
        if other.tcp.is_some() {
            self.tcp = other.tcp;
        }
        if other.pretty.is_some() {
            self.pretty = other.pretty;
        }
    }

    fn into_app_config(self) -> Result<AppConfig, ValidationError> {
        let mode = match (self.duration, self.count) {
            (Some(duration), None) => RunMode::Duration(duration),
            (None, Some(count)) => RunMode::Count(count),
            (Some(_), Some(_)) => {
                return Err(ValidationError {
                    field: "run",
                    message: "duration and count are mutually exclusive".into(),
                });
            }
            (None, None) => {
                return Err(ValidationError {
                    field: "run",
                    message: "either duration or count is required".into(),
                });
            }
        };

        let traffic = TrafficConfig {
            population: self.population.unwrap_or(DEFAULT_POPULATION),
            rate_per_user_per_minute: self
                .rate_per_user_per_minute
                .unwrap_or(DEFAULT_RATE_PER_USER_PER_MINUTE),
            fixed_rate: self.fixed_rate,
            jitter: self.jitter.unwrap_or(DEFAULT_JITTER),
        };

        let weights = match self.distribution.unwrap_or_default() {
            DistributionKind::LogNormal => WeightDistribution::LogNormal {
                mu: self.mu.unwrap_or(DEFAULT_LOGNORMAL_MU),
                sigma: self.sigma.unwrap_or(DEFAULT_LOGNORMAL_SIGMA),
            },
            DistributionKind::Pareto => WeightDistribution::Pareto {
                alpha: self.alpha.unwrap_or(DEFAULT_PARETO_ALPHA),
                x_min: self.x_min.unwrap_or(DEFAULT_PARETO_X_MIN),
            },
        };

        let run = RunConfig { mode, seed: self.seed.unwrap_or(0) };

        let sink = SinkConfig { tcp: self.tcp, pretty: self.pretty.unwrap_or(false) };

        Ok(AppConfig { traffic, weights, run, sink })
    }
}

pub fn load_from_toml(path: &Path) -> Result<PartialConfig, Error> {
    let content = fs::read_to_string(path)?;
    let toml_config: TomlConfig = toml::from_str(&content)?;
    Ok(toml_config.into())
}

pub fn load_from_env() -> PartialConfig {
    let mut config = PartialConfig::default();

    if let Some(v) = env_var("POPULATION") {
        config.population = v.parse().ok();
    }

    if let Some(v) = env_var("RATE_PER_USER_PER_MINUTE") {
        config.rate_per_user_per_minute = v.parse().ok();
    }

    if let Some(v) = env_var("FIXED_RATE") {
        config.fixed_rate = v.parse().ok();
    }

    if let Some(v) = env_var("JITTER") {
        config.jitter = v.parse().ok();
    }

    if let Some(v) = env_var("DISTRIBUTION") {
        config.distribution = parse_distribution(&v);
    }

    if let Some(v) = env_var("MU") {
        config.mu = v.parse().ok();
    }

    if let Some(v) = env_var("SIGMA") {
        config.sigma = v.parse().ok();
    }

    if let Some(v) = env_var("ALPHA") {
        config.alpha = v.parse().ok();
    }

    if let Some(v) = env_var("X_MIN") {
        config.x_min = v.parse().ok();
    }

    if let Some(v) = env_var("DURATION") {
        config.duration = parse_duration(&v);
    }

    if let Some(v) = env_var("COUNT") {
        config.count = v.parse().ok();
    }

    if let Some(v) = env_var("SEED") {
        config.seed = v.parse().ok();
    }

    if let Some(v) = env_var("TCP") {
        config.tcp = Some(v);
    }

    if let Some(v) = env_var("PRETTY") {
        config.pretty = parse_bool(&v);
    }

    config
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}")).ok()
}

// Returning None on unrecognized input allows the merge system to fall back
// to defaults rather than failing on typos in environment variables.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_distribution(s: &str) -> Option<DistributionKind> {
    match s.to_lowercase().as_str() {
        "lognormal" | "log-normal" => Some(DistributionKind::LogNormal),
        "pareto" => Some(DistributionKind::Pareto),
        _ => None,
    }
}

pub fn parse_duration(s: &str) -> Option<Duration> {
    humantime::parse_duration(s).ok()
}

pub fn validate(config: &AppConfig) -> Result<(), ValidationError> {
    if config.traffic.population < 1 {
        return Err(ValidationError { field: "population", message: "must be at least 1".into() });
    }

    if config.traffic.rate_per_user_per_minute <= 0.0 {
        return Err(ValidationError {
            field: "rate_per_user_per_minute",
            message: "must be positive".into(),
        });
    }

    if let Some(rate) = config.traffic.fixed_rate
        && rate <= 0.0
    {
        return Err(ValidationError { field: "fixed_rate", message: "must be positive".into() });
    }

    if !(0.0..1.0).contains(&config.traffic.jitter) {
        return Err(ValidationError { field: "jitter", message: "must be in [0, 1)".into() });
    }

    match config.weights {
        WeightDistribution::LogNormal { sigma, .. } => {
            if sigma <= 0.0 {
                return Err(ValidationError { field: "sigma", message: "must be positive".into() });
            }
        }
        WeightDistribution::Pareto { alpha, x_min } => {
            if alpha <= 0.0 {
                return Err(ValidationError { field: "alpha", message: "must be positive".into() });
            }
            if x_min <= 0.0 {
                return Err(ValidationError { field: "x_min", message: "must be positive".into() });
            }
        }
    }

    match config.run.mode {
        RunMode::Duration(duration) if duration.is_zero() => {
            return Err(ValidationError { field: "duration", message: "must be positive".into() });
        }
        RunMode::Count(count) if count < 1 => {
            return Err(ValidationError { field: "count", message: "must be at least 1".into() });
        }
        _ => {}
    }

    if let Some(ref addr) = config.sink.tcp
        && addr.parse::<std::net::SocketAddr>().is_err()
    {
        return Err(ValidationError { field: "tcp", message: format!("invalid address: '{addr}'") });
    }

    Ok(())
}

pub fn load(cli: PartialConfig) -> Result<AppConfig, Error> {
    let mut merged = PartialConfig::default();

    let config_path = cli.config_file.clone().or_else(|| {
        let default = PathBuf::from(CONFIG_FILE_NAME);
        default.exists().then_some(default)
    });

    if let Some(ref path) = config_path
        && path.exists()
    {
        let toml_config = load_from_toml(path)?;
        merged.merge_from(toml_config);
    }

    let env_config = load_from_env();
    merged.merge_from(env_config);

    merged.merge_from(cli);

    let config = merged.into_app_config()?;
    validate(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_config() -> PartialConfig {
        PartialConfig { count: Some(100), ..Default::default() }
    }

    #[test]
    fn test_defaults_with_count_mode() {
        let config = count_config().into_app_config().unwrap();
        let defaults = TrafficConfig::default();
        assert_eq!(config.traffic.population, defaults.population);
        assert_eq!(config.traffic.jitter, defaults.jitter);
        assert_eq!(config.run.mode, RunMode::Count(100));
        assert_eq!(config.run.seed, 0);
        assert!(config.sink.tcp.is_none());
        assert!(!config.sink.pretty);
        assert!(matches!(config.weights, WeightDistribution::LogNormal { .. }));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_mode_rejected() {
        let err = PartialConfig::default().into_app_config().unwrap_err();
        assert_eq!(err.field, "run");
    }

    #[test]
    fn test_both_modes_rejected() {
        let partial = PartialConfig {
            duration: Some(Duration::from_secs(10)),
            count: Some(5),
            ..Default::default()
        };
        let err = partial.into_app_config().unwrap_err();
        assert_eq!(err.field, "run");
    }

    #[test]
    fn test_mode_merges_as_a_unit() {
        let mut base =
            PartialConfig { duration: Some(Duration::from_secs(30)), ..Default::default() };
        base.merge_from(count_config());

        let config = base.into_app_config().unwrap();
        assert_eq!(config.run.mode, RunMode::Count(100));
    }

    #[test]
    fn test_validate_population_zero() {
        let mut partial = count_config();
        partial.population = Some(0);
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "population");
    }

    #[test]
    fn test_validate_non_positive_rate() {
        let mut partial = count_config();
        partial.rate_per_user_per_minute = Some(0.0);
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "rate_per_user_per_minute");
    }

    #[test]
    fn test_validate_negative_fixed_rate() {
        let mut partial = count_config();
        partial.fixed_rate = Some(-2.0);
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "fixed_rate");
    }

    #[test]
    fn test_validate_jitter_out_of_range() {
        let mut partial = count_config();
        partial.jitter = Some(1.0);
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "jitter");
    }

    #[test]
    fn test_validate_lognormal_sigma() {
        let mut partial = count_config();
        partial.sigma = Some(0.0);
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "sigma");
    }

    #[test]
    fn test_validate_pareto_parameters() {
        let mut partial = count_config();
        partial.distribution = Some(DistributionKind::Pareto);
        partial.alpha = Some(-1.0);
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "alpha");

        let mut partial = count_config();
        partial.distribution = Some(DistributionKind::Pareto);
        partial.x_min = Some(0.0);
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "x_min");
    }

    #[test]
    fn test_validate_zero_count() {
        let partial = PartialConfig { count: Some(0), ..Default::default() };
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "count");
    }

    #[test]
    fn test_validate_zero_duration() {
        let partial =
            PartialConfig { duration: Some(Duration::from_secs(0)), ..Default::default() };
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "duration");
    }

    #[test]
    fn test_validate_invalid_tcp_address() {
        let mut partial = count_config();
        partial.tcp = Some("not-an-address".into());
        let config = partial.into_app_config().unwrap();
        let err = validate(&config).unwrap_err();
        assert_eq!(err.field, "tcp");
    }

    #[test]
    fn test_parse_distribution() {
        assert_eq!(parse_distribution("lognormal"), Some(DistributionKind::LogNormal));
        assert_eq!(parse_distribution("LOG-NORMAL"), Some(DistributionKind::LogNormal));
        assert_eq!(parse_distribution("Pareto"), Some(DistributionKind::Pareto));
        assert_eq!(parse_distribution("zipf"), None);
    }

    #[test]
    fn test_parse_duration_strings() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("nonsense"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("invalid"), None);
    }

    #[test]
    fn test_toml_empty_file() {
        let toml_config: TomlConfig = toml::from_str("").unwrap();
        let partial: PartialConfig = toml_config.into();
        assert!(partial.population.is_none());
        assert!(partial.duration.is_none());
        assert!(partial.count.is_none());
    }

    #[test]
    fn test_toml_full_config() {
        let toml_str = r#"
[traffic]
population = 2000
rate_per_user_per_minute = 0.5
fixed_rate = 25.0
jitter = 0.1

[weights]
distribution = "pareto"
alpha = 2.0
x_min = 1.5

[run]
duration = "90s"
seed = 7

[sink]
tcp = "127.0.0.1:5514"
pretty = true
"#;
        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let partial: PartialConfig = toml_config.into();

        assert_eq!(partial.population, Some(2000));
        assert_eq!(partial.rate_per_user_per_minute, Some(0.5));
        assert_eq!(partial.fixed_rate, Some(25.0));
        assert_eq!(partial.jitter, Some(0.1));
        assert_eq!(partial.distribution, Some(DistributionKind::Pareto));
        assert_eq!(partial.alpha, Some(2.0));
        assert_eq!(partial.x_min, Some(1.5));
        assert_eq!(partial.duration, Some(Duration::from_secs(90)));
        assert_eq!(partial.seed, Some(7));
        assert_eq!(partial.tcp, Some("127.0.0.1:5514".into()));
        assert_eq!(partial.pretty, Some(true));
    }

    #[test]
    fn test_toml_unknown_section_rejected() {
        let toml_str = r#"
[unknown_section]
foo = "bar"
"#;
        let result: Result<TomlConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        let toml_str = r"
[traffic]
unknown_key = 123
";
        let result: Result<TomlConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_invalid_distribution_uses_default() {
        let toml_str = r#"
[weights]
distribution = "invalid_shape"
"#;
        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let partial: PartialConfig = toml_config.into();
        assert!(partial.distribution.is_none());
    }

    #[test]
    fn test_partial_config_merge_overrides() {
        let mut base =
            PartialConfig { population: Some(100), jitter: Some(0.3), ..Default::default() };

        let overlay = PartialConfig { population: Some(900), seed: Some(11), ..Default::default() };

        base.merge_from(overlay);

        assert_eq!(base.population, Some(900));
        assert_eq!(base.jitter, Some(0.3));
        assert_eq!(base.seed, Some(11));
    }
}
