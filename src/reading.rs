//! Parser for WeeWX loop packets published over MQTT.
//!
//! WeeWX publishes each loop packet as a flat JSON object. Depending on the
//! MQTT extension's configuration, numeric observations arrive either as JSON
//! numbers or as strings (`"68.04"`), so every field is coerced to `f64`
//! before it is used.
//!
//! # Payload Format
//!
//! ```text
//! {"dateTime": "1700000000.0", "outTemp_F": "68.04", "outHumidity": "55.0",
//!  "dewpoint_F": "50.1", "windSpeed_mph": "3.2", "windDir": "270.0",
//!  "relbarometer": "29.92", ...}
//! ```
//!
//! Unknown keys are ignored. `windDir` is the only optional field; WeeWX
//! leaves it out (or sends `null`) while the wind is calm.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const FIELD_DATE_TIME: &str = "dateTime";
pub const FIELD_OUT_TEMP: &str = "outTemp_F";
pub const FIELD_OUT_HUMIDITY: &str = "outHumidity";
pub const FIELD_DEWPOINT: &str = "dewpoint_F";
pub const FIELD_WIND_SPEED: &str = "windSpeed_mph";
pub const FIELD_WIND_DIR: &str = "windDir";
pub const FIELD_BAROMETER: &str = "relbarometer";

/// Wind direction used when the packet carries none.
pub const DEFAULT_WIND_DIR: f64 = 0.0;

/// Errors that can occur while parsing a loop packet.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} is not numeric: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(f64),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A single weather observation taken from a loop packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// When the station took the observation.
    pub timestamp: DateTime<Utc>,

    /// Outdoor temperature in °F.
    pub out_temp_f: f64,

    /// Outdoor relative humidity in percent.
    pub out_humidity: f64,

    /// Dew point in °F.
    pub dewpoint_f: f64,

    /// Wind speed in mph.
    pub wind_speed_mph: f64,

    /// Wind direction in compass degrees. `0.0` when not reported.
    pub wind_dir: f64,

    /// Relative barometric pressure in inHg.
    pub rel_barometer: f64,
}

/// Parse a raw MQTT payload into a [`Reading`].
///
/// # Example
///
/// ```
/// use weewx_wx::reading::parse_reading;
///
/// let payload = br#"{"dateTime": 1700000000, "outTemp_F": "68.04", "outHumidity": 55,
///     "dewpoint_F": 50.1, "windSpeed_mph": 3.2, "relbarometer": 29.92}"#;
/// let reading = parse_reading(payload).unwrap();
/// assert_eq!(reading.timestamp.timestamp(), 1_700_000_000);
/// assert_eq!(reading.wind_dir, 0.0);
/// ```
pub fn parse_reading(payload: &[u8]) -> ParseResult<Reading> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Object(fields) = value else {
        return Err(ParseError::NotAnObject);
    };
    reading_from_fields(&fields)
}

/// Build a [`Reading`] from an already-decoded JSON object.
pub fn reading_from_fields(fields: &Map<String, Value>) -> ParseResult<Reading> {
    let epoch = required_number(fields, FIELD_DATE_TIME)?;

    Ok(Reading {
        timestamp: timestamp_from_epoch(epoch)?,
        out_temp_f: required_number(fields, FIELD_OUT_TEMP)?,
        out_humidity: required_number(fields, FIELD_OUT_HUMIDITY)?,
        dewpoint_f: required_number(fields, FIELD_DEWPOINT)?,
        wind_speed_mph: required_number(fields, FIELD_WIND_SPEED)?,
        wind_dir: optional_number(fields, FIELD_WIND_DIR)?.unwrap_or(DEFAULT_WIND_DIR),
        rel_barometer: required_number(fields, FIELD_BAROMETER)?,
    })
}

fn required_number(fields: &Map<String, Value>, field: &'static str) -> ParseResult<f64> {
    let value = fields.get(field).ok_or(ParseError::MissingField(field))?;
    coerce_number(field, value)
}

/// An absent or `null` field is `None`; anything else must be numeric.
fn optional_number(fields: &Map<String, Value>, field: &'static str) -> ParseResult<Option<f64>> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce_number(field, value).map(Some),
    }
}

/// Coerce a loosely-typed JSON value to `f64`.
///
/// Accepts JSON numbers and strings holding a decimal number, with
/// surrounding whitespace allowed.
fn coerce_number(field: &'static str, value: &Value) -> ParseResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Convert fractional epoch seconds into a UTC timestamp.
fn timestamp_from_epoch(epoch: f64) -> ParseResult<DateTime<Utc>> {
    if !epoch.is_finite() {
        return Err(ParseError::InvalidTimestamp(epoch));
    }

    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1e9).round().min(999_999_999.0) as u32;

    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return Err(ParseError::InvalidTimestamp(epoch));
    }

    DateTime::from_timestamp(secs as i64, nanos).ok_or(ParseError::InvalidTimestamp(epoch))
}
