//! Open-Meteo fetch and normalization.
//!
//! Wind and temperature come from the `current_weather` block, pressure from
//! the `current` block (`surface_pressure`). Depending on [`FetchPlan`] both
//! blocks are requested in one call or in two; either way a reading is only
//! built when every field is present and valid.

use crate::error::FetchError;
use crate::normalize::{
    parse_local_timestamp, to_celsius, to_m_s, to_mm_hg, wind_direction_from_angle,
};
use crate::reading::{Precipitation, Reading};
use async_trait::async_trait;
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.open-meteo.com/v1/forecast";
const PRESSURE_FIELD: &str = "surface_pressure";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// One request carrying both the current-weather and surface-pressure flags.
    Combined,
    /// Separate requests; both must succeed.
    Split,
}

impl FetchPlan {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchPlan::Combined => "combined",
            FetchPlan::Split => "split",
        }
    }
}

impl fmt::Display for FetchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchPlan {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "combined" | "single" => Ok(FetchPlan::Combined),
            "split" | "dual" => Ok(FetchPlan::Split),
            other => Err(format!(
                "unknown fetch plan {other:?} (expected combined or split)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub api_url: Url,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,
    pub plan: FetchPlan,
    pub timeout: Duration,
}

/// Anything that can produce one normalized reading per call.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch_and_normalize(&self) -> Result<Reading, FetchError>;
}

#[derive(Debug, Default, Deserialize)]
struct OpenMeteoPayload {
    #[serde(default)]
    current_weather: Option<CurrentWeatherBlock>,
    #[serde(default)]
    current_weather_units: BTreeMap<String, String>,
    #[serde(default)]
    current: Option<CurrentBlock>,
    #[serde(default)]
    current_units: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherBlock {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    windspeed: Option<f64>,
    #[serde(default)]
    winddirection: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    #[serde(default)]
    surface_pressure: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum Query {
    Both,
    CurrentWeather,
    Pressure,
}

#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    http: reqwest::Client,
    config: SourceConfig,
}

impl OpenMeteoClient {
    pub fn new(http: reqwest::Client, config: SourceConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn request(&self, query: Query) -> Result<OpenMeteoPayload, FetchError> {
        let url = self.config.api_url.as_str();
        let mut params: Vec<(&str, String)> = vec![
            ("latitude", self.config.latitude.to_string()),
            ("longitude", self.config.longitude.to_string()),
            ("timezone", self.config.timezone.name().to_string()),
        ];
        if matches!(query, Query::Both | Query::CurrentWeather) {
            params.push(("current_weather", "true".to_string()));
        }
        if matches!(query, Query::Both | Query::Pressure) {
            params.push(("current", PRESSURE_FIELD.to_string()));
        }

        let response = self
            .http
            .get(url)
            .query(&params)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|err| FetchError::from_transport(url, err))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
                body: truncate(&body, 200),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| FetchError::from_transport(url, err))?;
        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl ReadingSource for OpenMeteoClient {
    async fn fetch_and_normalize(&self) -> Result<Reading, FetchError> {
        match self.config.plan {
            FetchPlan::Combined => {
                let payload = self.request(Query::Both).await?;
                build_reading(&payload, &payload, &self.config.timezone)
            }
            FetchPlan::Split => {
                let (weather, pressure) = tokio::try_join!(
                    self.request(Query::CurrentWeather),
                    self.request(Query::Pressure)
                )?;
                build_reading(&weather, &pressure, &self.config.timezone)
            }
        }
    }
}

fn build_reading(
    weather: &OpenMeteoPayload,
    pressure: &OpenMeteoPayload,
    tz: &Tz,
) -> Result<Reading, FetchError> {
    let current_weather = weather
        .current_weather
        .as_ref()
        .ok_or(FetchError::MissingField("current_weather"))?;

    let time = current_weather
        .time
        .as_deref()
        .ok_or(FetchError::MissingField("time"))?;
    let temperature = finite("temperature", current_weather.temperature)?;
    let windspeed = finite("windspeed", current_weather.windspeed)?;
    let winddirection = finite("winddirection", current_weather.winddirection)?;
    if !(0.0..=360.0).contains(&winddirection) {
        return Err(FetchError::invalid(
            "winddirection",
            format!("{winddirection} is outside 0..=360"),
        ));
    }

    let current = pressure
        .current
        .as_ref()
        .ok_or(FetchError::MissingField("current"))?;
    let surface_pressure = finite(PRESSURE_FIELD, current.surface_pressure)?;

    let temperature_unit = unit(&weather.current_weather_units, "temperature", "°C");
    let windspeed_unit = unit(&weather.current_weather_units, "windspeed", "km/h");
    let pressure_unit = unit(&pressure.current_units, PRESSURE_FIELD, "hPa");

    Ok(Reading {
        timestamp: parse_local_timestamp(time, tz)?,
        temperature: to_celsius(temperature, temperature_unit),
        wind_direction: wind_direction_from_angle(winddirection),
        wind_speed: to_m_s(windspeed, windspeed_unit),
        pressure: to_mm_hg(surface_pressure, pressure_unit),
        precipitation: Precipitation::Unknown,
    })
}

fn finite(field: &'static str, value: Option<f64>) -> Result<f64, FetchError> {
    let value = value.ok_or(FetchError::MissingField(field))?;
    if !value.is_finite() {
        return Err(FetchError::invalid(field, format!("{value} is not finite")));
    }
    Ok(value)
}

// Open-Meteo defaults apply when the units block omits a field.
fn unit<'a>(units: &'a BTreeMap<String, String>, field: &str, default: &'a str) -> &'a str {
    units.get(field).map(String::as_str).unwrap_or(default)
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}
