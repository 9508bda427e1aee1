//! Filter and capture configuration types
//!
//! This module defines the minimal configuration needed by the decoder library:
//! which device address and register to watch, and how long the capture loop
//! waits for bus activity.

use crate::types::{DecoderError, Result};

/// Largest monitor buffer requested in a single read
pub const DEFAULT_READ_BUFFER_SIZE: u16 = 32767;

/// Address+register filter, fixed for the whole capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionFilter {
    /// 7-bit target device address
    pub address: u8,
    /// Register byte expected right after the address byte
    pub register: u8,
}

impl TransactionFilter {
    /// Create a filter, rejecting values that cannot appear on the bus
    pub fn new(address: u32, register: u32) -> Result<Self> {
        if register >= 256 {
            return Err(DecoderError::InvalidFilter(format!(
                "filter_reg {} >= 256",
                register
            )));
        }
        if address > 0x7F {
            return Err(DecoderError::InvalidFilter(format!(
                "filter_addr 0x{:x} is not a 7-bit address",
                address
            )));
        }

        Ok(Self {
            address: address as u8,
            register: register as u8,
        })
    }

    /// Check whether an address+direction byte targets the filtered device
    pub fn matches_address_byte(&self, byte: u8) -> bool {
        byte >> 1 == self.address
    }
}

/// Settings for the capture loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// How long each poll waits for new bus activity
    pub timeout_ms: u32,

    /// Maximum number of events requested per read
    pub read_buffer_size: u16,
}

impl CaptureConfig {
    /// Create a capture configuration with the given poll timeout
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            timeout_ms,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Builder method: set the maximum events per read
    pub fn with_read_buffer_size(mut self, size: u16) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }
}

/// Parse an integer written in any common base
///
/// Accepts `0x` (hex), `0o` (octal), `0b` (binary) prefixes in either case,
/// or plain decimal. Underscores between digits are ignored.
pub fn parse_integer(text: &str) -> Result<u32> {
    let trimmed = text.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let (digits, radix) = match unsigned.get(..2) {
        Some("0x") | Some("0X") => (&unsigned[2..], 16),
        Some("0o") | Some("0O") => (&unsigned[2..], 8),
        Some("0b") | Some("0B") => (&unsigned[2..], 2),
        _ => (unsigned, 10),
    };

    let digits: String = digits.chars().filter(|&c| c != '_').collect();
    if digits.is_empty() {
        return Err(DecoderError::InvalidNumber(text.to_string()));
    }

    u32::from_str_radix(&digits, radix).map_err(|_| DecoderError::InvalidNumber(text.to_string()))
}
