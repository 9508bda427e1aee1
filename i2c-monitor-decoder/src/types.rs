//! Core types for the I2C monitor decoder library
//!
//! This module defines the raw event model reported by a bus monitor, the
//! error type shared by the library, and the matched transaction value that
//! the decoder hands back when a filtered transaction completes.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the decoder (wall-clock, local time)
pub type Timestamp = DateTime<Local>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Format used when a transaction group is stamped
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Monitor code for a START (or repeated START) condition
pub const MONITOR_CMD_START: u16 = 0xFF00;

/// Monitor code for a STOP condition
pub const MONITOR_CMD_STOP: u16 = 0xFF01;

/// Bit set on a data code when the byte was not acknowledged
pub const MONITOR_NACK: u16 = 0x0100;

/// Errors that can occur while filtering or capturing
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid number: {0:?}")]
    InvalidNumber(String),

    #[error("{operation} failed: {message} (status {code})")]
    DeviceError {
        /// Hardware operation that reported the failure
        operation: &'static str,
        /// Raw status code from the adapter
        code: i32,
        /// Human-readable status string from the adapter
        message: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DecoderError {
    /// Build a device error for the given operation and status
    pub fn device(operation: &'static str, code: i32, message: impl Into<String>) -> Self {
        DecoderError::DeviceError {
            operation,
            code,
            message: message.into(),
        }
    }
}

/// One event from the bus monitor stream
///
/// The monitor reports a flat sequence of 16-bit codes. Two reserved codes
/// mark bus conditions; every other code carries a byte in its low 8 bits
/// and the NACK flag in bit 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// START or repeated START condition
    Start,
    /// STOP condition
    Stop,
    /// A byte seen on the bus
    Data {
        /// Byte value (low 8 bits of the code)
        byte: u8,
        /// True if the receiver did not acknowledge the byte
        nack: bool,
        /// The full code as reported by the monitor
        raw: u16,
    },
}

impl MonitorEvent {
    /// Classify a raw monitor code. Never fails: anything that is not a
    /// START or STOP marker is treated as data.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            MONITOR_CMD_START => MonitorEvent::Start,
            MONITOR_CMD_STOP => MonitorEvent::Stop,
            _ => MonitorEvent::Data {
                byte: (raw & 0xFF) as u8,
                nack: raw & MONITOR_NACK != 0,
                raw,
            },
        }
    }

    /// Build a data event from a byte and its NACK flag
    pub fn data(byte: u8, nack: bool) -> Self {
        let raw = byte as u16 | if nack { MONITOR_NACK } else { 0 };
        MonitorEvent::Data { byte, nack, raw }
    }

    /// Get the 16-bit monitor code for this event
    pub fn to_raw(&self) -> u16 {
        match self {
            MonitorEvent::Start => MONITOR_CMD_START,
            MonitorEvent::Stop => MONITOR_CMD_STOP,
            MonitorEvent::Data { raw, .. } => *raw,
        }
    }
}

impl From<u16> for MonitorEvent {
    fn from(raw: u16) -> Self {
        MonitorEvent::from_raw(raw)
    }
}

/// Transfer direction encoded in bit 0 of an address byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Write,
    Read,
}

impl Direction {
    /// Extract the direction from an address+direction byte
    pub fn from_address_byte(byte: u8) -> Self {
        if byte & 0x01 != 0 {
            Direction::Read
        } else {
            Direction::Write
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Write => write!(f, "w"),
            Direction::Read => write!(f, "r"),
        }
    }
}

/// A transaction that matched the filter and was flushed on STOP
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedTransaction {
    /// Time the transaction group was first seen
    pub timestamp: Timestamp,
    /// 7-bit target address that matched
    pub address: u8,
    /// Register byte that matched
    pub register: u8,
    /// Rendered transaction, including the leading newline and trailing `[P]`
    pub text: String,
}
