//! Capture loop and monitor device interface
//!
//! The hardware adapter is reached only through the [`MonitorDevice`] trait,
//! so the loop can be driven by a real adapter or by a scripted device in
//! tests. [`MonitorSession`] owns the device while the monitor is enabled and
//! disables it again when dropped, on success and failure alike.

use crate::config::CaptureConfig;
use crate::decoder::{Clock, TransactionDecoder};
use crate::types::{MatchedTransaction, Result};
use std::io::Write;

/// A bus monitor that reports activity as 16-bit event codes
pub trait MonitorDevice {
    /// Put the adapter into passive monitor mode
    fn enable_monitor(&mut self) -> Result<()>;

    /// Leave monitor mode
    fn disable_monitor(&mut self) -> Result<()>;

    /// Wait up to `timeout_ms` for data; returns false if none arrived
    fn poll(&mut self, timeout_ms: u32) -> Result<bool>;

    /// Read all pending events, up to `max_events`
    fn read_events(&mut self, max_events: u16) -> Result<Vec<u16>>;
}

impl<D: MonitorDevice + ?Sized> MonitorDevice for &mut D {
    fn enable_monitor(&mut self) -> Result<()> {
        (**self).enable_monitor()
    }

    fn disable_monitor(&mut self) -> Result<()> {
        (**self).disable_monitor()
    }

    fn poll(&mut self, timeout_ms: u32) -> Result<bool> {
        (**self).poll(timeout_ms)
    }

    fn read_events(&mut self, max_events: u16) -> Result<Vec<u16>> {
        (**self).read_events(max_events)
    }
}

/// A device with its monitor enabled for the lifetime of this value
pub struct MonitorSession<D: MonitorDevice> {
    device: D,
    enabled: bool,
}

impl<D: MonitorDevice> MonitorSession<D> {
    /// Enable the monitor on `device`
    ///
    /// If enabling fails the device is dropped here, which releases it.
    pub fn start(mut device: D) -> Result<Self> {
        device.enable_monitor()?;
        log::debug!("Monitor enabled");
        Ok(Self {
            device,
            enabled: true,
        })
    }

    /// Disable the monitor, reporting a failure instead of only logging it
    pub fn finish(mut self) -> Result<()> {
        self.enabled = false;
        self.device.disable_monitor()
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: MonitorDevice> Drop for MonitorSession<D> {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(e) = self.device.disable_monitor() {
                log::warn!("Failed to disable monitor: {}", e);
            }
        }
    }
}

/// Destination for matched transactions
pub trait TransactionSink {
    fn write_transaction(&mut self, transaction: &MatchedTransaction) -> Result<()>;
}

impl TransactionSink for Vec<MatchedTransaction> {
    fn write_transaction(&mut self, transaction: &MatchedTransaction) -> Result<()> {
        self.push(transaction.clone());
        Ok(())
    }
}

/// Writes the rendered transaction text and flushes after every write
pub struct TextSink<W: Write> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TransactionSink for TextSink<W> {
    fn write_transaction(&mut self, transaction: &MatchedTransaction) -> Result<()> {
        self.writer.write_all(transaction.text.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Totals for one capture run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Buffer reads performed
    pub reads: u64,
    /// Events fed through the decoder
    pub events: u64,
    /// STOP conditions seen
    pub transactions: u64,
    /// Transactions written to the sink
    pub matched: u64,
}

/// Blocking poll/read loop feeding a decoder
pub struct Capture {
    config: CaptureConfig,
}

impl Capture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Wait for the first bus activity
    ///
    /// Returns false when the poll timed out with nothing pending.
    pub fn wait_for_data<D: MonitorDevice>(&self, session: &mut MonitorSession<D>) -> Result<bool> {
        session.device_mut().poll(self.config.timeout_ms)
    }

    /// Read and decode until a poll reports no more data
    ///
    /// Call after [`Capture::wait_for_data`] returned true. A failed read
    /// ends the loop with that error.
    pub fn run<D, C, S>(
        &self,
        session: &mut MonitorSession<D>,
        decoder: &mut TransactionDecoder<C>,
        sink: &mut S,
    ) -> Result<CaptureSummary>
    where
        D: MonitorDevice,
        C: Clock,
        S: TransactionSink + ?Sized,
    {
        let mut summary = CaptureSummary::default();
        let start_stats = decoder.stats();

        loop {
            let events = session
                .device_mut()
                .read_events(self.config.read_buffer_size)?;
            summary.reads += 1;
            log::debug!("Read {} monitor events", events.len());

            for raw in events {
                if let Some(transaction) = decoder.consume_raw(raw) {
                    sink.write_transaction(&transaction)?;
                }
            }

            if !session.device_mut().poll(self.config.timeout_ms)? {
                break;
            }
        }

        let stats = decoder.stats();
        summary.events = stats.events - start_stats.events;
        summary.transactions = stats.transactions - start_stats.transactions;
        summary.matched = stats.matched - start_stats.matched;

        log::info!(
            "Capture finished: {} reads, {} events, {} transactions, {} matched",
            summary.reads,
            summary.events,
            summary.transactions,
            summary.matched
        );
        Ok(summary)
    }
}
