//! Rendering of matched transactions to the console

use clap::ValueEnum;
use i2c_monitor_decoder::{MatchedTransaction, Result, TextSink, TransactionSink};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// How matched transactions are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Timestamped log line per transaction
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Writes each transaction as a single JSON line
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> TransactionSink for JsonSink<W> {
    fn write_transaction(&mut self, transaction: &MatchedTransaction) -> Result<()> {
        serde_json::to_writer(&mut self.writer, transaction).map_err(io::Error::from)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Build the sink for the requested format
pub fn sink_for<W: Write + 'static>(format: OutputFormat, writer: W) -> Box<dyn TransactionSink> {
    match format {
        OutputFormat::Text => Box::new(TextSink::new(writer)),
        OutputFormat::Json => Box::new(JsonSink::new(writer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i2c_monitor_decoder::{Timestamp, TransactionDecoder, TransactionFilter};

    fn matched() -> MatchedTransaction {
        let filter = TransactionFilter::new(0x48, 0x01).unwrap();
        let mut decoder = TransactionDecoder::new(filter);
        [0xFF00, 0x90, 0x01, 0x1A, 0xFF01]
            .iter()
            .find_map(|&code| decoder.consume_raw(code))
            .unwrap()
    }

    #[test]
    fn test_json_sink_writes_one_line() {
        let transaction = matched();
        let mut sink = JsonSink::new(Vec::new());
        sink.write_transaction(&transaction).unwrap();

        let written = String::from_utf8(sink.writer).unwrap();
        assert_eq!(written.lines().count(), 1);

        let value: serde_json::Value = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(value["address"], 0x48);
        assert_eq!(value["register"], 0x01);
        assert!(value["text"].as_str().unwrap().contains("<48:w> 90 01 1a [P]"));

        let timestamp: Timestamp = serde_json::from_value(value["timestamp"].clone()).unwrap();
        assert_eq!(timestamp, transaction.timestamp);
    }

    #[test]
    fn test_output_format_from_toml_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: OutputFormat,
        }
        let wrapper: Wrapper = toml::from_str("format = \"text\"").unwrap();
        assert_eq!(wrapper.format, OutputFormat::Text);
    }
}
