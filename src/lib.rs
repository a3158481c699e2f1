//! # GPS Relay Library
//!
//! Relay GPS positions from a serial-attached node to a tracking server.
//!
//! The node prints one JSON object per line. Every line carrying `latitude`
//! and `longitude` is posted once to the configured HTTP endpoint; everything
//! else is dropped.

pub mod cli;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod logging;
pub mod relay;
pub mod serial;
pub mod telemetry;
