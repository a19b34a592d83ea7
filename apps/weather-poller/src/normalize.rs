use crate::error::FetchError;
use crate::reading::CompassPoint;
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const HPA_TO_MMHG: f64 = 0.75006375541921;
pub const OPEN_METEO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Maps an angle in degrees to the nearest of eight compass points.
///
/// Angles outside [0, 360) wrap, so 360 is north again. Halfway angles round
/// away from zero (22.5 maps to NE).
pub fn wind_direction_from_angle(angle: f64) -> CompassPoint {
    let sector = (angle / 45.0).round().rem_euclid(8.0) as usize;
    CompassPoint::ALL[sector % 8]
}

/// Converts a wind speed to m/s. Only km/h is converted; any other unit is
/// assumed to already be m/s.
pub fn to_m_s(value: f64, unit: &str) -> f64 {
    let unit = unit.trim();
    if unit.eq_ignore_ascii_case("km/h") || unit.eq_ignore_ascii_case("kmh") {
        value / 3.6
    } else {
        value
    }
}

/// Converts a pressure to mmHg. Only hPa is converted.
pub fn to_mm_hg(value: f64, unit: &str) -> f64 {
    if unit.trim().eq_ignore_ascii_case("hPa") {
        value * HPA_TO_MMHG
    } else {
        value
    }
}

pub fn to_celsius(value: f64, unit: &str) -> f64 {
    let unit = unit.trim().trim_start_matches('°');
    if unit.eq_ignore_ascii_case("F") {
        (value - 32.0) * 5.0 / 9.0
    } else {
        value
    }
}

/// Parses Open-Meteo's naive `YYYY-MM-DDTHH:MM` in the timezone the request
/// asked for. Ambiguous wall-clock times resolve to the earlier instant.
pub fn parse_local_timestamp(raw: &str, tz: &Tz) -> Result<DateTime<Utc>, FetchError> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), OPEN_METEO_TIME_FORMAT)
        .map_err(|err| FetchError::invalid("time", format!("{raw:?}: {err}")))?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(local) => Ok(local.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(FetchError::invalid(
            "time",
            format!("{raw} does not exist in {}", tz.name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn cardinal_angles_map_to_labels() {
        assert_eq!(wind_direction_from_angle(0.0), CompassPoint::N);
        assert_eq!(wind_direction_from_angle(45.0), CompassPoint::NE);
        assert_eq!(wind_direction_from_angle(90.0), CompassPoint::E);
        assert_eq!(wind_direction_from_angle(180.0), CompassPoint::S);
        assert_eq!(wind_direction_from_angle(315.0), CompassPoint::NW);
        assert_eq!(wind_direction_from_angle(360.0), CompassPoint::N);
    }

    #[test]
    fn angles_round_to_nearest_sector() {
        assert_eq!(wind_direction_from_angle(22.0), CompassPoint::N);
        assert_eq!(wind_direction_from_angle(22.5), CompassPoint::NE);
        assert_eq!(wind_direction_from_angle(337.5), CompassPoint::N);
        assert_eq!(wind_direction_from_angle(200.0), CompassPoint::S);
    }

    #[test]
    fn direction_wraps_every_full_turn() {
        let mut angle = 0.0;
        while angle < 360.0 {
            assert_eq!(
                wind_direction_from_angle(angle),
                wind_direction_from_angle(angle + 360.0),
                "angle {angle}"
            );
            angle += 0.5;
        }
    }

    #[test]
    fn wind_speed_conversion() {
        assert_eq!(to_m_s(7.5, "m/s"), 7.5);
        assert!(approx(to_m_s(36.0, "km/h"), 10.0));
        assert_eq!(to_m_s(12.0, "kn"), 12.0);
    }

    #[test]
    fn pressure_conversion() {
        assert!((to_mm_hg(1000.0, "hPa") - 750.06).abs() < 0.01);
        assert_eq!(to_mm_hg(750.0, "mmHg"), 750.0);
    }

    #[test]
    fn temperature_conversion() {
        assert_eq!(to_celsius(21.5, "°C"), 21.5);
        assert!(approx(to_celsius(212.0, "°F"), 100.0));
    }

    #[test]
    fn local_timestamp_is_normalized_to_utc() {
        let tz: Tz = "Europe/Moscow".parse().expect("tz");
        let parsed = parse_local_timestamp("2024-01-15T12:30", &tz).expect("parse");
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).single().expect("utc");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn ambiguous_local_time_takes_earliest_instant() {
        let tz: Tz = "Europe/Berlin".parse().expect("tz");
        let parsed = parse_local_timestamp("2024-10-27T02:30", &tz).expect("parse");
        let expected = Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).single().expect("utc");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn malformed_or_missing_local_time_is_rejected() {
        let tz: Tz = "Europe/Berlin".parse().expect("tz");
        assert!(matches!(
            parse_local_timestamp("15/01/2024 12:30", &tz),
            Err(FetchError::InvalidField { field: "time", .. })
        ));
        assert!(parse_local_timestamp("2024-03-31T02:30", &tz).is_err());
    }
}
