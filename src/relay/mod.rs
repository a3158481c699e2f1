//! # Relay Module
//!
//! The read → parse → forward loop.
//!
//! Lines are handled strictly one at a time and in arrival order. No per-line
//! failure stops the loop: malformed input, rejected requests and unreachable
//! servers are logged and the relay goes back to waiting for the next line.
//! Lines that parse but lack a position are dropped without a log entry.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::forwarder::{Forward, SendResult};
use crate::serial::LineSource;
use crate::telemetry::{parse_line, ParseResult};

/// Number of lines between status log messages
pub const STATUS_INTERVAL_LINES: u64 = 100;

/// What happened to one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Sent and acknowledged with 200
    Forwarded,
    /// Sent, server answered with another status
    Rejected(u16),
    /// Sent, no response
    Unreachable,
    /// Not valid JSON
    Malformed,
    /// Valid JSON without a position
    Discarded,
}

/// Running counters for one relay session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStats {
    pub started_at: DateTime<Utc>,
    pub lines_read: u64,
    pub forwarded: u64,
    pub rejected: u64,
    pub unreachable: u64,
    pub malformed: u64,
    pub discarded: u64,
}

impl Default for RelayStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            lines_read: 0,
            forwarded: 0,
            rejected: 0,
            unreachable: 0,
            malformed: 0,
            discarded: 0,
        }
    }
}

impl RelayStats {
    fn record(&mut self, outcome: &LineOutcome) {
        self.lines_read += 1;
        match outcome {
            LineOutcome::Forwarded => self.forwarded += 1,
            LineOutcome::Rejected(_) => self.rejected += 1,
            LineOutcome::Unreachable => self.unreachable += 1,
            LineOutcome::Malformed => self.malformed += 1,
            LineOutcome::Discarded => self.discarded += 1,
        }
    }

    /// Records that reached the server but were not accepted, plus those that never arrived
    pub fn failed(&self) -> u64 {
        self.rejected + self.unreachable
    }

    /// Log a one-line summary
    pub fn log_summary(&self) {
        let uptime = Utc::now().signed_duration_since(self.started_at);
        info!(
            "Relay stats after {}s: {} lines read, {} forwarded, {} failed, {} malformed",
            uptime.num_seconds(),
            self.lines_read,
            self.forwarded,
            self.failed(),
            self.malformed
        );
    }
}

/// Pulls lines from a [`LineSource`] and hands positions to a [`Forward`]er
pub struct Relay<L, F> {
    source: L,
    forwarder: F,
    stats: RelayStats,
}

impl<L: LineSource, F: Forward> Relay<L, F> {
    pub fn new(source: L, forwarder: F) -> Self {
        Self {
            source,
            forwarder,
            stats: RelayStats::default(),
        }
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Run until the line source ends or fails
    ///
    /// A live serial port never ends, so in production this only returns on
    /// a read error.
    ///
    /// # Errors
    ///
    /// Returns the line source's error; per-line failures never end the loop
    pub async fn run(&mut self) -> Result<RelayStats> {
        info!("Waiting for GPS data");

        while let Some(line) = self.source.next_line().await? {
            self.process_line(&line).await;

            if self.stats.lines_read % STATUS_INTERVAL_LINES == 0 {
                self.stats.log_summary();
            }
        }

        warn!("Line source ended");
        Ok(self.stats.clone())
    }

    /// Parse one line and forward it if it carries a position
    pub async fn process_line(&mut self, line: &str) -> LineOutcome {
        info!("Received line: {}", line);

        let outcome = match parse_line(line) {
            ParseResult::Record(record) => match self.forwarder.forward(&record).await {
                SendResult::Delivered => {
                    info!(
                        "Forwarded position (latitude {}, longitude {})",
                        record.latitude, record.longitude
                    );
                    LineOutcome::Forwarded
                }
                SendResult::HttpError(status) => {
                    warn!("Server rejected position update with status code {}", status);
                    LineOutcome::Rejected(status)
                }
                SendResult::TransportError(detail) => {
                    error!("Failed to contact server: {}", detail);
                    LineOutcome::Unreachable
                }
            },
            ParseResult::MalformedInput(e) => {
                warn!("Received data is not valid JSON: {}", e);
                LineOutcome::Malformed
            }
            ParseResult::MissingFields => LineOutcome::Discarded,
        };

        self.stats.record(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpsRelayError;
    use crate::forwarder::MockForward;
    use crate::serial::port_trait::mocks::{MockSerialPort, MockSleeper, PortEvent};
    use crate::serial::SerialLineReader;
    use crate::telemetry::TelemetryRecord;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Collects the level of every event emitted while installed
    #[derive(Clone, Default)]
    struct LevelRecorder {
        levels: Arc<Mutex<Vec<Level>>>,
    }

    impl LevelRecorder {
        fn count(&self, level: Level) -> usize {
            self.levels.lock().unwrap().iter().filter(|l| **l == level).count()
        }
    }

    impl<S: Subscriber> Layer<S> for LevelRecorder {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.levels.lock().unwrap().push(*event.metadata().level());
        }
    }

    fn with_recorder() -> (LevelRecorder, tracing::subscriber::DefaultGuard) {
        let recorder = LevelRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        (recorder, tracing::subscriber::set_default(subscriber))
    }

    type TestRelay = Relay<SerialLineReader<MockSerialPort, MockSleeper>, MockForward>;

    fn relay(port: MockSerialPort, forwarder: MockForward) -> TestRelay {
        let reader = SerialLineReader::new(port, MockSleeper::new(), Duration::from_secs(1));
        Relay::new(reader, forwarder)
    }

    fn lines(text: &[&str]) -> MockSerialPort {
        let joined: Vec<String> = text.iter().map(|l| format!("{}\n", l)).collect();
        let refs: Vec<&str> = joined.iter().map(String::as_str).collect();
        MockSerialPort::with_text(&refs)
    }

    fn position(latitude: f64, longitude: f64) -> TelemetryRecord {
        TelemetryRecord {
            latitude: json!(latitude),
            longitude: json!(longitude),
        }
    }

    #[tokio::test]
    async fn test_valid_line_is_forwarded_once() {
        let mut forwarder = MockForward::new();
        forwarder
            .expect_forward()
            .with(eq(position(-6.2, 106.8)))
            .times(1)
            .returning(|_| SendResult::Delivered);

        let mut relay = relay(lines(&[r#"{"latitude": -6.2, "longitude": 106.8}"#]), forwarder);
        let stats = relay.run().await.unwrap();

        assert_eq!(stats.lines_read, 1);
        assert_eq!(stats.forwarded, 1);
    }

    #[tokio::test]
    async fn test_malformed_line_is_not_forwarded() {
        let mut forwarder = MockForward::new();
        forwarder.expect_forward().times(0);

        let mut relay = relay(lines(&["not json at all"]), forwarder);
        let stats = relay.run().await.unwrap();

        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.forwarded, 0);
    }

    #[tokio::test]
    async fn test_missing_keys_are_discarded() {
        let mut forwarder = MockForward::new();
        forwarder.expect_forward().times(0);

        let mut relay = relay(
            lines(&[r#"{"foo": 1}"#, r#"{"latitude": 1.0}"#, r#"{"longitude": 2.0}"#]),
            forwarder,
        );
        let stats = relay.run().await.unwrap();

        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.discarded, 3);
    }

    #[tokio::test]
    async fn test_rejected_update_is_not_retried() {
        let mut forwarder = MockForward::new();
        forwarder
            .expect_forward()
            .with(eq(position(1.0, 2.0)))
            .times(1)
            .returning(|_| SendResult::HttpError(500));
        forwarder
            .expect_forward()
            .with(eq(position(3.0, 4.0)))
            .times(1)
            .returning(|_| SendResult::Delivered);

        let mut relay = relay(
            lines(&[
                r#"{"latitude": 1.0, "longitude": 2.0}"#,
                r#"{"latitude": 3.0, "longitude": 4.0}"#,
            ]),
            forwarder,
        );
        let stats = relay.run().await.unwrap();

        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.forwarded, 1);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_stop_the_loop() {
        let mut forwarder = MockForward::new();
        forwarder
            .expect_forward()
            .times(2)
            .returning(|_| SendResult::TransportError("connection refused".to_string()));

        let mut relay = relay(
            lines(&[
                r#"{"latitude": 1.0, "longitude": 2.0}"#,
                r#"{"latitude": 1.0, "longitude": 2.0}"#,
            ]),
            forwarder,
        );
        let stats = relay.run().await.unwrap();

        assert_eq!(stats.unreachable, 2);
        assert_eq!(stats.failed(), 2);
    }

    #[tokio::test]
    async fn test_lines_are_forwarded_in_order() {
        let mut seq = Sequence::new();
        let mut forwarder = MockForward::new();
        for (lat, lon) in [(1.0, 1.5), (2.0, 2.5), (3.0, 3.5)] {
            forwarder
                .expect_forward()
                .with(eq(position(lat, lon)))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| SendResult::Delivered);
        }

        let mut relay = relay(
            lines(&[
                r#"{"latitude": 1.0, "longitude": 1.5}"#,
                "garbage",
                r#"{"latitude": 2.0, "longitude": 2.5}"#,
                r#"{"status": "no fix"}"#,
                r#"{"latitude": 3.0, "longitude": 3.5}"#,
            ]),
            forwarder,
        );
        let stats = relay.run().await.unwrap();

        assert_eq!(stats.lines_read, 5);
        assert_eq!(stats.forwarded, 3);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.discarded, 1);
    }

    #[tokio::test]
    async fn test_process_line_outcomes() {
        let mut forwarder = MockForward::new();
        forwarder
            .expect_forward()
            .returning(|record| match record.latitude.as_f64() {
                Some(lat) if lat > 0.0 => SendResult::Delivered,
                Some(_) => SendResult::HttpError(503),
                None => SendResult::TransportError("timed out".to_string()),
            });

        let mut relay = relay(MockSerialPort::new(vec![]), forwarder);

        assert_eq!(
            relay.process_line(r#"{"latitude": 1.0, "longitude": 2.0}"#).await,
            LineOutcome::Forwarded
        );
        assert_eq!(
            relay.process_line(r#"{"latitude": -1.0, "longitude": 2.0}"#).await,
            LineOutcome::Rejected(503)
        );
        assert_eq!(
            relay.process_line(r#"{"latitude": null, "longitude": 2.0}"#).await,
            LineOutcome::Unreachable
        );
        assert_eq!(relay.process_line("").await, LineOutcome::Malformed);
        assert_eq!(relay.process_line(r#"{"foo": 1}"#).await, LineOutcome::Discarded);

        let stats = relay.stats();
        assert_eq!(stats.lines_read, 5);
        assert_eq!(
            (stats.forwarded, stats.rejected, stats.unreachable, stats.malformed, stats.discarded),
            (1, 1, 1, 1, 1)
        );
    }

    #[tokio::test]
    async fn test_read_error_ends_the_run() {
        let mut forwarder = MockForward::new();
        forwarder.expect_forward().times(1).returning(|_| SendResult::Delivered);

        let port = MockSerialPort::new(vec![
            PortEvent::Data(b"{\"latitude\": 1.0, \"longitude\": 2.0}\n".to_vec()),
            PortEvent::Error(io::ErrorKind::BrokenPipe),
        ]);
        let mut relay = relay(port, forwarder);

        assert!(matches!(relay.run().await, Err(GpsRelayError::Serial(_))));
        assert_eq!(relay.stats().forwarded, 1);
    }

    #[tokio::test]
    async fn test_malformed_line_logs_one_warning() {
        let mut forwarder = MockForward::new();
        forwarder.expect_forward().times(0);
        let mut relay = relay(MockSerialPort::new(vec![]), forwarder);

        let (recorder, _guard) = with_recorder();
        relay.process_line("not json at all").await;

        assert_eq!(recorder.count(Level::WARN), 1);
        assert_eq!(recorder.count(Level::ERROR), 0);
    }

    #[tokio::test]
    async fn test_missing_keys_log_no_warning_or_error() {
        let mut forwarder = MockForward::new();
        forwarder.expect_forward().times(0);
        let mut relay = relay(MockSerialPort::new(vec![]), forwarder);

        let (recorder, _guard) = with_recorder();
        relay.process_line(r#"{"foo": 1}"#).await;
        relay.process_line(r#"{"latitude": 1.0}"#).await;

        assert_eq!(recorder.count(Level::WARN), 0);
        assert_eq!(recorder.count(Level::ERROR), 0);
    }

    #[tokio::test]
    async fn test_unreachable_server_logs_an_error() {
        let mut forwarder = MockForward::new();
        forwarder
            .expect_forward()
            .times(1)
            .returning(|_| SendResult::TransportError("connection refused".to_string()));
        let mut relay = relay(MockSerialPort::new(vec![]), forwarder);

        let (recorder, _guard) = with_recorder();
        relay.process_line(r#"{"latitude": 1.0, "longitude": 2.0}"#).await;

        assert_eq!(recorder.count(Level::ERROR), 1);
    }

    #[tokio::test]
    async fn test_source_end_is_logged_as_warning() {
        let mut forwarder = MockForward::new();
        forwarder.expect_forward().times(0);
        let mut relay = relay(MockSerialPort::new(vec![]), forwarder);

        let (recorder, _guard) = with_recorder();
        relay.run().await.unwrap();

        assert_eq!(recorder.count(Level::WARN), 1);
        assert_eq!(recorder.count(Level::ERROR), 0);
    }

    #[test]
    fn test_status_interval_constant() {
        assert_eq!(STATUS_INTERVAL_LINES, 100);
    }
}
