//! I2C Monitor Decoder Library
//!
//! A small, reusable library for framing and filtering I2C traffic reported
//! by a passive bus monitor (such as an Aardvark I2C/SPI adapter in monitor
//! mode).
//!
//! # Architecture
//!
//! - Classifies raw 16-bit monitor codes into START, STOP and data events
//! - Frames events into transactions, including repeated-START groups
//! - Keeps only transactions whose address and first payload byte (the
//!   register) match a filter, rendering them as one log line each
//! - Drives any [`MonitorDevice`] through a blocking poll/read loop
//!
//! The library does NOT:
//! - Talk to adapter hardware directly (see the `aamonitor` application)
//! - Interpret SMBus/PMBus or device-specific protocols
//! - Store or replay captures
//!
//! # Example Usage
//!
//! ```
//! use i2c_monitor_decoder::{TransactionDecoder, TransactionFilter};
//!
//! let filter = TransactionFilter::new(0x70, 0x96).unwrap();
//! let mut decoder = TransactionDecoder::new(filter);
//!
//! let codes = [0xFF00, 0xE0, 0x96, 0xFF00, 0xE1, 0x00, 0x80, 0x135, 0xFF01];
//! for code in codes {
//!     if let Some(transaction) = decoder.consume_raw(code) {
//!         print!("{}", transaction.text);
//!     }
//! }
//! ```

// Public modules
pub mod capture;
pub mod config;
pub mod decoder;
pub mod types;

// Re-export main types for convenience
pub use capture::{Capture, CaptureSummary, MonitorDevice, MonitorSession, TextSink, TransactionSink};
pub use config::{parse_integer, CaptureConfig, TransactionFilter, DEFAULT_READ_BUFFER_SIZE};
pub use decoder::{Clock, DecoderStats, SystemClock, TransactionDecoder};
pub use types::{
    DecoderError, Direction, MatchedTransaction, MonitorEvent, Result, Timestamp,
    MONITOR_CMD_START, MONITOR_CMD_STOP, MONITOR_NACK, TIME_FORMAT,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a fresh decoder has consumed nothing
        let decoder = TransactionDecoder::new(TransactionFilter::new(0x50, 0x00).unwrap());
        assert_eq!(decoder.stats(), DecoderStats::default());
        assert!(decoder.pending_text().is_empty());
    }
}
