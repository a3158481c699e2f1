//! # Telemetry Module
//!
//! Turns one line of serial text into a [`TelemetryRecord`].
//!
//! The GPS node prints one JSON object per line, for example:
//!
//! ```text
//! {"latitude": -6.2, "longitude": 106.8, "sats": 7}
//! ```
//!
//! Only the presence of `latitude` and `longitude` is checked. Their values are
//! kept as raw JSON and handed to the forwarder untouched.

use serde_json::Value;

/// Key holding the latitude in an incoming line
pub const LATITUDE_KEY: &str = "latitude";

/// Key holding the longitude in an incoming line
pub const LONGITUDE_KEY: &str = "longitude";

/// A position decoded from one serial line
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub latitude: Value,
    pub longitude: Value,
}

/// Outcome of parsing one line
#[derive(Debug)]
pub enum ParseResult {
    /// The line held both position keys
    Record(TelemetryRecord),
    /// The line is not valid JSON
    MalformedInput(serde_json::Error),
    /// Valid JSON without `latitude` and `longitude`
    MissingFields,
}

/// Parse a trimmed serial line
///
/// # Examples
///
/// ```
/// use gps_relay::telemetry::{parse_line, ParseResult};
///
/// match parse_line(r#"{"latitude": -6.2, "longitude": 106.8}"#) {
///     ParseResult::Record(record) => assert_eq!(record.latitude, -6.2),
///     other => panic!("unexpected {:?}", other),
/// }
/// ```
pub fn parse_line(line: &str) -> ParseResult {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return ParseResult::MalformedInput(e),
    };

    // Arrays, strings and numbers are valid JSON but carry no keys
    let Value::Object(mut fields) = value else {
        return ParseResult::MissingFields;
    };

    match (fields.remove(LATITUDE_KEY), fields.remove(LONGITUDE_KEY)) {
        (Some(latitude), Some(longitude)) => {
            ParseResult::Record(TelemetryRecord { latitude, longitude })
        }
        _ => ParseResult::MissingFields,
    }
}
