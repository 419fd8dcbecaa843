//! weewx-wx - Turn WeeWX loop packets from MQTT into overlay-ready weather text.
//!
//! This crate provides:
//! - A parser for loop packets with loose numeric coercion
//! - Rendering into a one-line summary and a structured per-field record
//! - An async MQTT client with bounded, backed-off reconnection
//! - A subscriber that overwrites the output files on every reading
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::Local;
//! use weewx_wx::{FieldFormats, OutputWriter, parse_reading, render};
//!
//! let payload = br#"{"dateTime": 1700000000, "outTemp_F": 68.04, "outHumidity": 55,
//!     "dewpoint_F": 50.1, "windSpeed_mph": 3.2, "relbarometer": 29.92}"#;
//! let reading = parse_reading(payload).expect("Failed to parse reading");
//! let output = render(&reading, &FieldFormats::default(), &Local);
//!
//! OutputWriter::default().write(&output).expect("Failed to write output");
//! println!("{}", output.summary);
//! ```

pub mod client;
pub mod config;
pub mod output;
pub mod reading;
pub mod render;
pub mod stats;
pub mod subscriber;

pub use client::{WxClient, WxClientConfig, WxEvent};
pub use config::Config;
pub use output::{OutputError, OutputWriter};
pub use reading::{ParseError, Reading, parse_reading};
pub use render::{FieldFormat, FieldFormats, RenderedOutput, WxField, WxRecord, render};
pub use stats::{MessageStats, StatsSummary};
pub use subscriber::{HandleError, Subscriber};
