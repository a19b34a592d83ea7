use crate::cli::Args;
use crate::console::InputMode;
use crate::fetch::{FetchPlan, SourceConfig, DEFAULT_API_URL};
use crate::scheduler::BackoffPolicy;
use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,
    pub api_url: Url,
    pub fetch_plan: FetchPlan,
    pub http_timeout: Duration,

    pub poll_interval: Duration,
    pub max_poll_interval: Duration,

    pub database_path: PathBuf,
    pub export_path: PathBuf,
    pub export_limit: usize,

    pub input_mode: InputMode,
    pub input_poll_slice: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let latitude = env_f64("WEATHER_LATITUDE", Some(55.69674))?;
        let longitude = env_f64("WEATHER_LONGITUDE", Some(37.35283))?;
        let timezone = env_parsed::<Tz>("WEATHER_TIMEZONE", "Europe/Moscow")?;
        let api_url = env_string("WEATHER_API_URL", Some(DEFAULT_API_URL.to_string()))?;
        let api_url = Url::parse(&api_url).context("invalid WEATHER_API_URL")?;
        let fetch_plan = env_parsed::<FetchPlan>("WEATHER_FETCH_PLAN", "combined")?;
        let http_timeout =
            Duration::from_secs(env_u64("WEATHER_HTTP_TIMEOUT_SECONDS", Some(12))?);

        let poll_interval =
            Duration::from_secs(env_u64("WEATHER_POLL_INTERVAL_SECONDS", Some(180))?);
        let max_poll_interval =
            Duration::from_secs(env_u64("WEATHER_MAX_POLL_INTERVAL_SECONDS", Some(3600))?);

        let database_path =
            PathBuf::from(env_string("WEATHER_DATABASE_PATH", Some("weather.db".to_string()))?);
        let export_path = PathBuf::from(env_string(
            "WEATHER_EXPORT_PATH",
            Some("weather_data.xlsx".to_string()),
        )?);
        let export_limit = env_u64("WEATHER_EXPORT_LIMIT", Some(10))? as usize;

        let input_mode = env_parsed::<InputMode>("WEATHER_INPUT_MODE", "auto")?;
        let input_poll_slice =
            Duration::from_millis(env_u64("WEATHER_INPUT_POLL_MS", Some(1000))?);

        let config = Self {
            latitude,
            longitude,
            timezone,
            api_url,
            fetch_plan,
            http_timeout,
            poll_interval,
            max_poll_interval,
            database_path,
            export_path,
            export_limit,
            input_mode,
            input_poll_slice,
        };
        config.validate()?;
        Ok(config)
    }

    /// Applies CLI flags over the environment and re-validates.
    pub fn with_args(mut self, args: &Args) -> Result<Self> {
        if let Some(path) = &args.database {
            self.database_path = path.clone();
        }
        if let Some(path) = &args.export_path {
            self.export_path = path.clone();
        }
        if let Some(mode) = args.input {
            self.input_mode = mode;
        }
        if let Some(secs) = args.poll_interval_seconds {
            self.poll_interval = Duration::from_secs(secs);
        }
        if let Some(plan) = args.fetch_plan {
            self.fetch_plan = plan;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            bail!("latitude {} is outside -90..=90", self.latitude);
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            bail!("longitude {} is outside -180..=180", self.longitude);
        }
        if self.poll_interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }
        if self.input_poll_slice.is_zero() || self.input_poll_slice > Duration::from_secs(1) {
            bail!("input poll slice must be between 1ms and 1s");
        }
        if self.http_timeout.is_zero() {
            bail!("http timeout must be greater than zero");
        }
        if self.export_limit == 0 {
            bail!("export limit must be at least 1");
        }
        Ok(())
    }

    pub fn source(&self) -> SourceConfig {
        SourceConfig {
            api_url: self.api_url.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone,
            plan: self.fetch_plan,
            timeout: self.http_timeout,
        }
    }

    /// A cap below the base interval is raised to the base interval.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.poll_interval, self.max_poll_interval)
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_f64(key: &str, default: Option<f64>) -> Result<f64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_parsed<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_string(key, Some(default.to_string()))?;
    raw.parse::<T>()
        .map_err(|err| anyhow!("invalid {key} {raw:?}: {err}"))
}
