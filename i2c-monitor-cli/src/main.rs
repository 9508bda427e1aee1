//! I2C Monitor CLI Application
//!
//! Command-line front end for the i2c-monitor-decoder library. It adds:
//! - Argument parsing and an optional TOML configuration file
//! - The Aardvark adapter binding (loaded at runtime)
//! - Text or JSON rendering of matched transactions to stdout

use anyhow::Result;
use clap::Parser;
use i2c_monitor_decoder::{
    parse_integer, Capture, CaptureConfig, MonitorSession, TransactionDecoder, TransactionFilter,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

mod aardvark;
mod config;
mod output;

use aardvark::{Aardvark, AardvarkApi};
use config::AppConfig;
use output::OutputFormat;

/// Monitor I2C traffic with an Aardvark adapter, filtered by device address and register
#[derive(Parser, Debug)]
#[command(name = "aamonitor")]
#[command(about = "Monitor I2C traffic filtered by slave address and register", long_about = None)]
#[command(version)]
#[command(after_help = "Exit status:\n  \
0  capture finished or no data arrived\n  \
1  filter, library, open, configure, monitor or read error\n  \
2  usage error")]
struct Args {
    /// Aardvark adapter port number
    port: u16,

    /// Slave address as an integer (0x.., 0o.., 0b.. or decimal)
    #[arg(value_parser = parse_number)]
    addr: u32,

    /// Slave register as an integer (0x.., 0o.., 0b.. or decimal)
    #[arg(value_parser = parse_number)]
    reg: u32,

    /// Timeout interval in ms
    timeout_ms: u32,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the Aardvark shared library
    #[arg(long, value_name = "FILE")]
    library: Option<PathBuf>,

    /// Output format for matched transactions
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn parse_number(text: &str) -> std::result::Result<u32, String> {
    parse_integer(text).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("aamonitor v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using decoder library v{}", i2c_monitor_decoder::VERSION);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    let filter = TransactionFilter::new(args.addr, args.reg)?;
    let format = args.format.unwrap_or(config.output.format);
    let library = args
        .library
        .clone()
        .or_else(|| config.adapter.library.clone())
        .unwrap_or_else(aardvark::default_library_path);

    // The adapter closes on drop, so every early return below releases it
    let api = AardvarkApi::load(&library)?;
    let mut device = Aardvark::open(api, args.port)?;
    device.configure(&config.adapter.options())?;

    let mut session = MonitorSession::start(device)?;
    println!("Enabled I2C monitor.");

    let capture = Capture::new(
        CaptureConfig::new(args.timeout_ms)
            .with_read_buffer_size(config.adapter.read_buffer_size),
    );

    log::debug!("Capture settings: {:?}", capture.config());
    let mut decoder = TransactionDecoder::new(filter);

    println!("Waiting {} ms for first transaction...", args.timeout_ms);
    println!(
        "  Filtering on device address 0x{:03x} and register 0x{:03x}",
        decoder.filter().address,
        decoder.filter().register
    );

    if !capture.wait_for_data(&mut session)? {
        println!("  no data pending.");
        session.finish()?;
        return Ok(());
    }
    println!("  data received");

    let mut sink = output::sink_for(format, io::stdout());
    let summary = capture.run(&mut session, &mut decoder, sink.as_mut())?;
    println!("  No more data pending.");
    log::debug!("{:?}", summary);

    session.finish()?;
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_arguments() {
        let args = Args::try_parse_from(["aamonitor", "0", "0x70", "0x96", "500"]).unwrap();
        assert_eq!(args.port, 0);
        assert_eq!(args.addr, 0x70);
        assert_eq!(args.reg, 0x96);
        assert_eq!(args.timeout_ms, 500);
        assert!(args.format.is_none());
    }

    #[test]
    fn test_missing_arguments_are_rejected() {
        assert!(Args::try_parse_from(["aamonitor", "0", "0x70", "0x96"]).is_err());
    }

    #[test]
    fn test_timeout_is_decimal_only() {
        assert!(Args::try_parse_from(["aamonitor", "0", "0x70", "0x96", "0x10"]).is_err());
    }

    #[test]
    fn test_register_out_of_range_fails_filter() {
        let args = Args::try_parse_from(["aamonitor", "0", "0x70", "256", "500"]).unwrap();
        assert!(TransactionFilter::new(args.addr, args.reg).is_err());
    }

    #[test]
    fn test_options() {
        let args = Args::try_parse_from([
            "aamonitor", "1", "80", "0o20", "100", "--format", "json", "--library", "/tmp/aardvark.so", "-vv",
        ])
        .unwrap();
        assert_eq!(args.addr, 80);
        assert_eq!(args.reg, 0o20);
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert_eq!(args.library, Some(PathBuf::from("/tmp/aardvark.so")));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_help_documents_exit_status() {
        use clap::CommandFactory;

        let help = Args::command().render_help().to_string();
        assert!(help.contains("Exit status:"));
        assert!(help.contains("1  filter, library, open, configure, monitor or read error"));
        assert!(help.contains("2  usage error"));
    }
}
