//! Rendering of readings into overlay text and a structured record.
//!
//! Every reading produces two artifacts: a one-line summary meant to be
//! drawn as-is, and a [`WxRecord`] that carries each formatted value next to
//! the format spec used to produce it, so downstream renderers can lay the
//! fields out themselves.

use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reading::Reading;

/// Timestamp layout used at the start of the summary line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest number of decimals accepted for a field.
pub const MAX_PRECISION: usize = 6;

/// Fixed decimal precision for one numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFormat {
    pub precision: usize,
}

impl FieldFormat {
    pub const fn new(precision: usize) -> Self {
        Self { precision }
    }

    /// Format a value with this precision.
    pub fn apply(&self, value: f64) -> String {
        format!("{:.*}", self.precision, value)
    }

    /// The format spec handed to downstream renderers, e.g. `{:.1f}`.
    pub fn spec(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FieldFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{:.{}f}}", self.precision)
    }
}

/// Precision for each of the six rendered fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFormats {
    pub temperature: FieldFormat,
    pub humidity: FieldFormat,
    pub dewpoint: FieldFormat,
    pub wind_speed: FieldFormat,
    pub wind_dir: FieldFormat,
    pub pressure: FieldFormat,
}

impl Default for FieldFormats {
    fn default() -> Self {
        Self {
            temperature: FieldFormat::new(1),
            humidity: FieldFormat::new(0),
            dewpoint: FieldFormat::new(1),
            wind_speed: FieldFormat::new(1),
            wind_dir: FieldFormat::new(1),
            pressure: FieldFormat::new(2),
        }
    }
}

impl FieldFormats {
    /// Override the wind direction precision.
    pub fn with_wind_dir_precision(mut self, precision: usize) -> Self {
        self.wind_dir = FieldFormat::new(precision);
        self
    }
}

/// A formatted value paired with the format spec that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WxField {
    pub value: String,
    pub format: String,
}

impl WxField {
    fn new(value: f64, format: FieldFormat) -> Self {
        Self {
            value: format.apply(value),
            format: format.spec(),
        }
    }
}

/// The structured record written to the JSON output file.
///
/// Field order is the serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WxRecord {
    #[serde(rename = "WX_TEMP")]
    pub temperature: WxField,

    #[serde(rename = "WX_HUMIDITY")]
    pub humidity: WxField,

    #[serde(rename = "WX_DEWPOINT")]
    pub dewpoint: WxField,

    #[serde(rename = "WX_WIND_SPEED")]
    pub wind_speed: WxField,

    #[serde(rename = "WX_WIND_DIR")]
    pub wind_dir: WxField,

    #[serde(rename = "WX_PRESSURE")]
    pub pressure: WxField,
}

impl WxRecord {
    /// Serialize to the compact JSON written to disk.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// The two artifacts rendered from one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    /// One-line overlay text, without a trailing newline.
    pub summary: String,

    /// Per-field values and their format specs.
    pub record: WxRecord,
}

/// Render a reading, showing its timestamp in the given time zone.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use weewx_wx::reading::parse_reading;
/// use weewx_wx::render::{FieldFormats, render};
///
/// let payload = br#"{"dateTime": 1700000000, "outTemp_F": 68.04, "outHumidity": 55,
///     "dewpoint_F": 50.1, "windSpeed_mph": 3.2, "relbarometer": 29.92}"#;
/// let reading = parse_reading(payload).unwrap();
/// let output = render(&reading, &FieldFormats::default(), &Utc);
/// assert_eq!(
///     output.summary,
///     "2023-11-14 22:13:20  Temp: 68.0F  Humidity: 55%  Dewpoint: 50.1F  Wind: 3.2mph@0.0  Pressure: 29.92inHg"
/// );
/// ```
pub fn render<Tz>(reading: &Reading, formats: &FieldFormats, tz: &Tz) -> RenderedOutput
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let record = WxRecord {
        temperature: WxField::new(reading.out_temp_f, formats.temperature),
        humidity: WxField::new(reading.out_humidity, formats.humidity),
        dewpoint: WxField::new(reading.dewpoint_f, formats.dewpoint),
        wind_speed: WxField::new(reading.wind_speed_mph, formats.wind_speed),
        wind_dir: WxField::new(reading.wind_dir, formats.wind_dir),
        pressure: WxField::new(reading.rel_barometer, formats.pressure),
    };

    let timestamp = reading.timestamp.with_timezone(tz);
    let summary = format!(
        "{}  Temp: {}F  Humidity: {}%  Dewpoint: {}F  Wind: {}mph@{}  Pressure: {}inHg",
        timestamp.format(TIMESTAMP_FORMAT),
        record.temperature.value,
        record.humidity.value,
        record.dewpoint.value,
        record.wind_speed.value,
        record.wind_dir.value,
        record.pressure.value,
    );

    RenderedOutput { summary, record }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::parse_reading;
    use chrono::{DateTime, FixedOffset, Utc};
    use proptest::prelude::*;

    const SAMPLE: &str = r#"{"dateTime": 1700000000, "outTemp_F": 68.04, "outHumidity": 55,
        "dewpoint_F": 50.1, "windSpeed_mph": 3.2, "relbarometer": 29.92}"#;

    fn make_reading(value: f64) -> Reading {
        Reading {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            out_temp_f: value,
            out_humidity: value,
            dewpoint_f: value,
            wind_speed_mph: value,
            wind_dir: value,
            rel_barometer: value,
        }
    }

    #[test]
    fn test_render_summary_without_wind_dir() {
        let reading = parse_reading(SAMPLE.as_bytes()).unwrap();
        let output = render(&reading, &FieldFormats::default(), &Utc);

        assert_eq!(
            output.summary,
            "2023-11-14 22:13:20  Temp: 68.0F  Humidity: 55%  Dewpoint: 50.1F  Wind: 3.2mph@0.0  Pressure: 29.92inHg"
        );
    }

    #[test]
    fn test_render_summary_with_wind_dir() {
        let payload = SAMPLE.replace("\"relbarometer\"", "\"windDir\": 270, \"relbarometer\"");
        let reading = parse_reading(payload.as_bytes()).unwrap();
        let output = render(&reading, &FieldFormats::default(), &Utc);

        assert!(output.summary.contains("  Wind: 3.2mph@270.0  "));
        assert!(!output.summary.ends_with('\n'));
    }

    #[test]
    fn test_render_in_other_time_zone() {
        let reading = parse_reading(SAMPLE.as_bytes()).unwrap();
        let pacific = FixedOffset::west_opt(8 * 3600).unwrap();
        let output = render(&reading, &FieldFormats::default(), &pacific);

        assert!(output.summary.starts_with("2023-11-14 14:13:20  Temp:"));
    }

    #[test]
    fn test_wind_dir_precision_override() {
        let reading = make_reading(269.6);
        let formats = FieldFormats::default().with_wind_dir_precision(0);
        let output = render(&reading, &formats, &Utc);

        assert_eq!(output.record.wind_dir.value, "270");
        assert_eq!(output.record.wind_dir.format, "{:.0f}");
        assert!(output.summary.contains("mph@270  "));
    }

    #[test]
    fn test_record_formats() {
        let reading = parse_reading(SAMPLE.as_bytes()).unwrap();
        let record = render(&reading, &FieldFormats::default(), &Utc).record;

        assert_eq!(record.temperature.format, "{:.1f}");
        assert_eq!(record.humidity.format, "{:.0f}");
        assert_eq!(record.dewpoint.format, "{:.1f}");
        assert_eq!(record.wind_speed.format, "{:.1f}");
        assert_eq!(record.wind_dir.format, "{:.1f}");
        assert_eq!(record.pressure.format, "{:.2f}");
        assert_eq!(record.pressure.value, "29.92");
    }

    #[test]
    fn test_record_json_has_exactly_six_keys() {
        let reading = parse_reading(SAMPLE.as_bytes()).unwrap();
        let record = render(&reading, &FieldFormats::default(), &Utc).record;
        let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        let object = json.as_object().unwrap();
        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "WX_DEWPOINT",
                "WX_HUMIDITY",
                "WX_PRESSURE",
                "WX_TEMP",
                "WX_WIND_DIR",
                "WX_WIND_SPEED"
            ]
        );
        assert_eq!(json["WX_TEMP"]["value"], "68.0");
        assert_eq!(json["WX_TEMP"]["format"], "{:.1f}");
        assert_eq!(json["WX_HUMIDITY"]["value"], "55");
    }

    #[test]
    fn test_field_format_display_matches_spec() {
        let format = FieldFormat::new(2);
        assert_eq!(format.to_string(), format.spec());
        assert_eq!(format.apply(29.915_1), "29.92");
    }

    proptest! {
        #[test]
        fn prop_values_use_field_precision(value in -1000.0f64..1000.0) {
            let output = render(&make_reading(value), &FieldFormats::default(), &Utc);
            let record = &output.record;

            let decimals = |s: &str| s.split_once('.').map(|(_, d)| d.len()).unwrap_or(0);
            prop_assert_eq!(decimals(&record.temperature.value), 1);
            prop_assert_eq!(decimals(&record.humidity.value), 0);
            prop_assert_eq!(decimals(&record.dewpoint.value), 1);
            prop_assert_eq!(decimals(&record.wind_speed.value), 1);
            prop_assert_eq!(decimals(&record.wind_dir.value), 1);
            prop_assert_eq!(decimals(&record.pressure.value), 2);

            let parsed: f64 = record.pressure.value.parse().unwrap();
            prop_assert!((parsed - value).abs() <= 0.005 + 1e-9);
        }

        #[test]
        fn prop_summary_carries_record_values(value in -1000.0f64..1000.0) {
            let output = render(&make_reading(value), &FieldFormats::default(), &Utc);
            let record = &output.record;

            let expected_tail = format!(
                "Temp: {}F  Humidity: {}%  Dewpoint: {}F  Wind: {}mph@{}  Pressure: {}inHg",
                record.temperature.value,
                record.humidity.value,
                record.dewpoint.value,
                record.wind_speed.value,
                record.wind_dir.value,
                record.pressure.value,
            );
            prop_assert!(output.summary.ends_with(&expected_tail));
        }
    }
}
