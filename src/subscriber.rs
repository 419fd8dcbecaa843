//! Event handlers for the loop-packet subscription.
//!
//! [`Subscriber`] holds everything a message needs (output paths, field
//! formats, statistics) and exposes one handler per client event. The caller
//! owns the receive loop and feeds events in one at a time, so a message is
//! fully rendered and written before the next one is looked at.

use chrono::{Local, TimeZone};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::client::WxEvent;
use crate::output::{OutputError, OutputWriter};
use crate::reading::{ParseError, parse_reading};
use crate::render::{FieldFormats, RenderedOutput, render};
use crate::stats::MessageStats;

/// Errors that can occur while handling one message.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("Rejected payload: {0}")]
    Parse(#[from] ParseError),

    #[error("Failed to write output: {0}")]
    Output(#[from] OutputError),
}

/// Turns loop packets into overlay files.
pub struct Subscriber<Tz: TimeZone = Local> {
    writer: OutputWriter,
    formats: FieldFormats,
    stats: Arc<MessageStats>,
    tz: Tz,
}

impl Subscriber<Local> {
    /// Create a subscriber that renders timestamps in the local time zone.
    pub fn new(writer: OutputWriter, formats: FieldFormats, stats: Arc<MessageStats>) -> Self {
        Self::with_time_zone(writer, formats, stats, Local)
    }
}

impl<Tz> Subscriber<Tz>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    /// Create a subscriber that renders timestamps in `tz`.
    pub fn with_time_zone(
        writer: OutputWriter,
        formats: FieldFormats,
        stats: Arc<MessageStats>,
        tz: Tz,
    ) -> Self {
        Self {
            writer,
            formats,
            stats,
            tz,
        }
    }

    pub fn stats(&self) -> &MessageStats {
        &self.stats
    }

    /// Route a client event to its handler.
    ///
    /// Breaks once the client has given up on the broker.
    pub fn dispatch(&self, event: WxEvent) -> ControlFlow<()> {
        match event {
            WxEvent::Connected {
                session_present,
                code,
            } => self.on_connect(session_present, &code),
            WxEvent::Subscribed {
                topic,
                return_codes,
            } => self.on_subscribed(&topic, &return_codes),
            WxEvent::Message { topic, payload } => {
                // Failures are logged and counted; the previous files stay in place
                let _ = self.on_message(&topic, &payload);
            }
            WxEvent::Disconnected(reason) => self.on_disconnect(&reason),
            WxEvent::Error(e) => error!("Error: {}", e),
            WxEvent::GaveUp { attempts } => {
                error!("Giving up after {} failed connection attempts", attempts);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    pub fn on_connect(&self, session_present: bool, code: &str) {
        self.stats.record_connection();
        info!(
            "Connected with result code {} (session present: {})",
            code, session_present
        );
    }

    pub fn on_subscribed(&self, topic: &str, return_codes: &str) {
        info!("Subscribed to {} (return codes: {})", topic, return_codes);
    }

    pub fn on_disconnect(&self, reason: &str) {
        warn!("Disconnected: {}", reason);
    }

    /// Parse, render and persist one loop packet.
    pub fn on_message(&self, topic: &str, payload: &[u8]) -> Result<RenderedOutput, HandleError> {
        self.stats.record_message(payload.len());
        debug!("{}: {}", topic, String::from_utf8_lossy(payload));

        let output = self.process(payload).inspect_err(|e| {
            match e {
                HandleError::Parse(_) => self.stats.record_parse_failure(),
                HandleError::Output(_) => self.stats.record_write_failure(),
            }
            error!("{}", e);
        })?;

        self.stats.record_written();
        Ok(output)
    }

    fn process(&self, payload: &[u8]) -> Result<RenderedOutput, HandleError> {
        let reading = parse_reading(payload)?;
        let output = render(&reading, &self.formats, &self.tz);

        info!("{}", output.summary);
        debug!("{:?}", output.record);

        self.writer.write(&output)?;
        Ok(output)
    }
}
