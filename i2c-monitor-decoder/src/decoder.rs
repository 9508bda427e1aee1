//! Transaction decoder
//!
//! This module turns the flat stream of monitor events into framed I2C
//! transactions and decides, byte by byte, whether the transaction being
//! framed matches the address+register filter. Text for the current
//! transaction is buffered until STOP, because the register byte that decides
//! the match arrives after the START and address have already been seen.

use crate::config::TransactionFilter;
use crate::types::{Direction, MatchedTransaction, MonitorEvent, Timestamp, TIME_FORMAT};
use chrono::Local;

/// Source of wall-clock time for transaction timestamps
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Local::now()
    }
}

impl<F> Clock for F
where
    F: Fn() -> Timestamp,
{
    fn now(&self) -> Timestamp {
        self()
    }
}

/// The two most recently consumed events
///
/// Slot 0 is the previous event, slot 1 the one before it. Both start empty,
/// so nothing is treated as an address byte until a START has been seen.
#[derive(Debug, Clone, Copy, Default)]
struct Lookback {
    slots: [Option<MonitorEvent>; 2],
}

impl Lookback {
    fn push(&mut self, event: MonitorEvent) {
        self.slots = [Some(event), self.slots[0]];
    }

    fn last(&self) -> Option<MonitorEvent> {
        self.slots[0]
    }

    fn second_last(&self) -> Option<MonitorEvent> {
        self.slots[1]
    }
}

/// Running counters for a decoding session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Events consumed
    pub events: u64,
    /// STOP conditions seen
    pub transactions: u64,
    /// Transactions that matched the filter and were flushed
    pub matched: u64,
}

/// Streaming state machine that frames and filters I2C transactions
pub struct TransactionDecoder<C: Clock = SystemClock> {
    filter: TransactionFilter,
    clock: C,
    lookback: Lookback,
    /// Sticky until STOP once the register byte matched
    displaying: bool,
    address_matched: bool,
    /// True between the first START of a group and the next STOP
    group_open: bool,
    group_timestamp: Option<Timestamp>,
    line_buffer: String,
    stats: DecoderStats,
}

impl TransactionDecoder<SystemClock> {
    /// Create a decoder stamping transactions with the local system time
    pub fn new(filter: TransactionFilter) -> Self {
        Self::with_clock(filter, SystemClock)
    }
}

impl<C: Clock> TransactionDecoder<C> {
    /// Create a decoder with a custom time source
    pub fn with_clock(filter: TransactionFilter, clock: C) -> Self {
        Self {
            filter,
            clock,
            lookback: Lookback::default(),
            displaying: false,
            address_matched: false,
            group_open: false,
            group_timestamp: None,
            line_buffer: String::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Consume one monitor event
    ///
    /// Returns the flushed transaction when a STOP closes a transaction that
    /// matched the filter. Any other event only updates the decoder state.
    pub fn consume(&mut self, event: MonitorEvent) -> Option<MatchedTransaction> {
        self.stats.events += 1;
        log::trace!("event 0x{:04x}: {:?}", event.to_raw(), event);

        let flushed = match event {
            MonitorEvent::Start => {
                self.on_start();
                None
            }
            MonitorEvent::Stop => self.on_stop(),
            MonitorEvent::Data { byte, nack, raw } => {
                self.on_data(byte, nack, raw);
                None
            }
        };

        self.lookback.push(event);
        flushed
    }

    /// Consume one raw 16-bit monitor code
    pub fn consume_raw(&mut self, raw: u16) -> Option<MatchedTransaction> {
        self.consume(MonitorEvent::from_raw(raw))
    }

    fn on_start(&mut self) {
        if self.group_open {
            // Repeated START: same group, no new timestamp
            self.line_buffer.push_str("[S]");
            return;
        }

        let timestamp = self.clock.now();
        self.line_buffer.clear();
        self.line_buffer
            .push_str(&format!("\n{} : [S] ", timestamp.format(TIME_FORMAT)));
        self.group_timestamp = Some(timestamp);
        self.group_open = true;
    }

    fn on_stop(&mut self) -> Option<MatchedTransaction> {
        self.stats.transactions += 1;

        let flushed = if self.displaying {
            self.line_buffer.push_str("[P]\n");
            self.stats.matched += 1;

            let transaction = MatchedTransaction {
                timestamp: self.group_timestamp.unwrap_or_else(|| self.clock.now()),
                address: self.filter.address,
                register: self.filter.register,
                text: std::mem::take(&mut self.line_buffer),
            };
            log::debug!(
                "Matched transaction for 0x{:02x}/0x{:02x}",
                transaction.address,
                transaction.register
            );
            Some(transaction)
        } else {
            if !self.line_buffer.is_empty() {
                log::trace!("Dropping unmatched transaction: {:?}", self.line_buffer);
            }
            None
        };

        self.displaying = false;
        self.address_matched = false;
        self.group_open = false;
        self.group_timestamp = None;
        self.line_buffer.clear();

        flushed
    }

    fn on_data(&mut self, byte: u8, nack: bool, raw: u16) {
        let suffix = if nack { "*" } else { "" };

        match (self.lookback.last(), self.lookback.second_last()) {
            // Address+direction byte right after START
            (Some(MonitorEvent::Start), _) => {
                if self.filter.matches_address_byte(byte) {
                    self.address_matched = true;
                    self.line_buffer.push_str(&format!(
                        " <{:02x}:{}>{} ",
                        byte >> 1,
                        Direction::from_address_byte(byte),
                        suffix
                    ));
                }
            }
            // Register byte right after a matching address byte. The full
            // code is compared, so a NACKed register byte never matches.
            (Some(MonitorEvent::Data { byte: address, .. }), Some(MonitorEvent::Start))
                if self.filter.matches_address_byte(address) =>
            {
                if raw == self.filter.register as u16 {
                    self.displaying = true;
                }
            }
            _ => {}
        }

        self.line_buffer.push_str(&format!("{:02x}{} ", byte, suffix));
    }

    /// Get the active filter
    pub fn filter(&self) -> &TransactionFilter {
        &self.filter
    }

    /// True once the current transaction's register byte matched
    pub fn is_displaying(&self) -> bool {
        self.displaying
    }

    /// True once the current transaction's address byte matched
    pub fn address_matched(&self) -> bool {
        self.address_matched
    }

    /// Text buffered for the transaction currently being framed
    pub fn pending_text(&self) -> &str {
        &self.line_buffer
    }

    /// Get the session counters
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MONITOR_CMD_START, MONITOR_CMD_STOP};
    use chrono::TimeZone;

    const S: u16 = MONITOR_CMD_START;
    const P: u16 = MONITOR_CMD_STOP;

    fn fixed_time() -> Timestamp {
        Local.with_ymd_and_hms(2023, 3, 23, 15, 28, 50).unwrap()
    }

    fn decoder(address: u32, register: u32) -> TransactionDecoder<impl Clock> {
        let filter = TransactionFilter::new(address, register).unwrap();
        TransactionDecoder::with_clock(filter, fixed_time)
    }

    fn feed<C: Clock>(decoder: &mut TransactionDecoder<C>, codes: &[u16]) -> Vec<MatchedTransaction> {
        codes.iter().filter_map(|&code| decoder.consume_raw(code)).collect()
    }

    #[test]
    fn test_combined_transaction_is_flushed_on_stop() {
        let mut dec = decoder(0x70, 0x96);
        let out = feed(&mut dec, &[S, 0xE0, 0x96, S, 0xE1, 0x00, 0x80, 0x135, P]);

        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].text,
            "\n2023-03-23 15:28:50 : [S]  <70:w> e0 96 [S] <70:r> e1 00 80 35* [P]\n"
        );
        assert_eq!(out[0].timestamp, fixed_time());
        assert_eq!(out[0].address, 0x70);
        assert_eq!(out[0].register, 0x96);
    }

    #[test]
    fn test_no_stop_means_no_output() {
        let mut dec = decoder(0x70, 0x96);
        let out = feed(&mut dec, &[S, 0xE0, 0x96, S, 0xE1, 0x00, 0x80, 0x135]);

        assert!(out.is_empty());
        assert!(dec.is_displaying());
        assert!(dec.pending_text().ends_with("35* "));
    }

    #[test]
    fn test_address_mismatch_suppresses_tag_and_match() {
        let mut dec = decoder(0x71, 0x96);

        feed(&mut dec, &[S, 0xE0]);
        assert!(!dec.address_matched());
        assert!(!dec.pending_text().contains('<'));
        assert!(dec.pending_text().ends_with("[S] e0 "));

        let out = feed(&mut dec, &[0x96, S, 0xE1, 0x00, P]);
        assert!(out.is_empty());
        assert_eq!(dec.stats().transactions, 1);
        assert_eq!(dec.stats().matched, 0);
    }

    #[test]
    fn test_register_mismatch_drops_transaction() {
        let mut dec = decoder(0x70, 0x97);
        let out = feed(&mut dec, &[S, 0xE0, 0x96, 0x01, P]);

        assert!(out.is_empty());
        assert!(dec.pending_text().is_empty());
    }

    #[test]
    fn test_register_only_checked_in_first_payload_slot() {
        let mut dec = decoder(0x70, 0x96);
        let out = feed(&mut dec, &[S, 0xE0, 0x01, 0x96, P]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_nacked_register_byte_does_not_match() {
        let mut dec = decoder(0x70, 0x96);
        let out = feed(&mut dec, &[S, 0xE0, 0x196, P]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_nacked_address_carries_suffix() {
        let mut dec = decoder(0x70, 0x96);
        feed(&mut dec, &[S, 0x1E0]);
        assert!(dec.pending_text().ends_with(" <70:w>* e0* "));
    }

    #[test]
    fn test_displaying_resets_after_stop() {
        let mut dec = decoder(0x70, 0x96);
        let first = feed(&mut dec, &[S, 0xE0, 0x96, P]);
        assert_eq!(first.len(), 1);
        assert!(!dec.is_displaying());

        let second = feed(&mut dec, &[S, 0xE0, 0x10, P]);
        assert!(second.is_empty());
    }

    #[test]
    fn test_each_group_gets_one_timestamp() {
        let mut dec = decoder(0x70, 0x96);
        let out = feed(
            &mut dec,
            &[S, 0xE0, 0x96, S, 0xE1, 0x01, P, S, 0xE0, 0x96, P],
        );

        assert_eq!(out.len(), 2);
        for transaction in &out {
            assert_eq!(transaction.text.matches(" : ").count(), 1);
            assert!(transaction.text.starts_with("\n2023-03-23 15:28:50 : [S] "));
        }
        assert_eq!(out[0].text.matches("[S]").count(), 2);
        assert_eq!(out[1].text.matches("[S]").count(), 1);
    }

    #[test]
    fn test_filtered_device_after_repeated_start() {
        let mut dec = decoder(0x50, 0x10);
        assert_eq!(dec.filter(), &TransactionFilter::new(0x50, 0x10).unwrap());

        let out = feed(&mut dec, &[S, 0xA2, 0x10, S, 0xA0, 0x10, P]);

        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].text,
            "\n2023-03-23 15:28:50 : [S] a2 10 [S] <50:w> a0 10 [P]\n"
        );
    }

    #[test]
    fn test_data_before_first_start_is_not_an_address() {
        let mut dec = decoder(0x70, 0x96);
        let out = feed(&mut dec, &[0xE0, 0x96, P, S, 0xE0, 0x96, P]);

        assert_eq!(out.len(), 1);
        assert_eq!(dec.stats().transactions, 2);
    }

    #[test]
    fn test_stats_count_events() {
        let mut dec = decoder(0x70, 0x96);
        feed(&mut dec, &[S, 0xE0, 0x96, P]);
        assert_eq!(
            dec.stats(),
            DecoderStats { events: 4, transactions: 1, matched: 1 }
        );
    }

    #[test]
    fn test_lookback_window() {
        let mut lookback = Lookback::default();
        assert_eq!(lookback.last(), None);

        lookback.push(MonitorEvent::Start);
        lookback.push(MonitorEvent::data(0xE0, false));
        assert_eq!(lookback.last(), Some(MonitorEvent::data(0xE0, false)));
        assert_eq!(lookback.second_last(), Some(MonitorEvent::Start));
    }
}
