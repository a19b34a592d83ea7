use chrono::{DateTime, Utc};
use std::fmt;

/// Eight-point compass rose, clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompassPoint {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl CompassPoint {
    pub const ALL: [CompassPoint; 8] = [
        CompassPoint::N,
        CompassPoint::NE,
        CompassPoint::E,
        CompassPoint::SE,
        CompassPoint::S,
        CompassPoint::SW,
        CompassPoint::W,
        CompassPoint::NW,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CompassPoint::N => "N",
            CompassPoint::NE => "NE",
            CompassPoint::E => "E",
            CompassPoint::SE => "SE",
            CompassPoint::S => "S",
            CompassPoint::SW => "SW",
            CompassPoint::W => "W",
            CompassPoint::NW => "NW",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|point| point.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for CompassPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Open-Meteo's current-weather block carries no precipitation field, so every
/// reading is `Unknown` until a source for it is wired in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precipitation {
    Unknown,
    Reported(String),
}

impl Precipitation {
    pub const UNKNOWN_LABEL: &'static str = "unknown";

    pub fn as_str(&self) -> &str {
        match self {
            Precipitation::Unknown => Self::UNKNOWN_LABEL,
            Precipitation::Reported(value) => value,
        }
    }

    pub fn from_stored(raw: String) -> Self {
        if raw == Self::UNKNOWN_LABEL {
            Precipitation::Unknown
        } else {
            Precipitation::Reported(raw)
        }
    }
}

impl fmt::Display for Precipitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized observation. Built whole or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    /// °C
    pub temperature: f64,
    pub wind_direction: CompassPoint,
    /// m/s
    pub wind_speed: f64,
    /// mmHg
    pub pressure: f64,
    pub precipitation: Precipitation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub id: i64,
    pub reading: Reading,
}
