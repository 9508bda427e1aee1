//! Aardvark I2C/SPI adapter binding
//!
//! The vendor ships the adapter API as a shared library (`aardvark.so` /
//! `aardvark.dll`) that is loaded at runtime, the same way the vendor's own
//! language bindings do it. Only the calls needed for passive I2C monitoring
//! are bound here.

use anyhow::{bail, Context};
use i2c_monitor_decoder::{DecoderError, MonitorDevice, Result};
use libloading::Library;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

pub const AA_CONFIG_SPI_I2C: c_int = 0x03;
pub const AA_I2C_PULLUP_NONE: u8 = 0x00;
pub const AA_I2C_PULLUP_BOTH: u8 = 0x03;
pub const AA_TARGET_POWER_NONE: u8 = 0x00;
pub const AA_TARGET_POWER_BOTH: u8 = 0x03;
pub const AA_ASYNC_NO_DATA: c_int = 0x00;

type OpenFn = unsafe extern "C" fn(port: c_int) -> c_int;
type HandleFn = unsafe extern "C" fn(handle: c_int) -> c_int;
type ConfigureFn = unsafe extern "C" fn(handle: c_int, config: c_int) -> c_int;
type MaskFn = unsafe extern "C" fn(handle: c_int, mask: u8) -> c_int;
type PollFn = unsafe extern "C" fn(handle: c_int, timeout: c_int) -> c_int;
type MonitorReadFn = unsafe extern "C" fn(handle: c_int, num_data: u16, data: *mut u16) -> c_int;

/// Default library file name for the current platform
pub fn default_library_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("aardvark.dll")
    } else {
        PathBuf::from("aardvark.so")
    }
}

/// Vendor description of an adapter status code
pub fn status_string(status: i32) -> &'static str {
    match status {
        0 => "ok",
        -1 => "unable to load library",
        -2 => "unable to load USB driver",
        -3 => "unable to load binding function",
        -4 => "incompatible library version",
        -5 => "incompatible device version",
        -6 => "communication error",
        -7 => "unable to open device",
        -8 => "unable to close device",
        -9 => "invalid device handle",
        -10 => "configuration error",
        -100 => "i2c feature not available",
        -101 => "i2c not enabled",
        -102 => "i2c read error",
        -103 => "i2c write error",
        -104 => "i2c slave enable bad config",
        -105 => "i2c slave read error",
        -106 => "i2c slave timeout",
        -107 => "i2c slave dropped excess bytes",
        -108 => "i2c bus already free",
        -200 => "spi feature not available",
        -201 => "spi not enabled",
        -202 => "spi write error",
        -203 => "spi slave read error",
        -204 => "spi slave timeout",
        -205 => "spi slave dropped excess bytes",
        -400 => "gpio feature not available",
        -500 => "i2c monitor feature not available",
        -501 => "i2c monitor not enabled",
        _ => "unknown status",
    }
}

fn check(operation: &'static str, status: c_int) -> Result<c_int> {
    if status < 0 {
        Err(DecoderError::device(operation, status, status_string(status)))
    } else {
        Ok(status)
    }
}

/// Function table resolved from the vendor library
pub struct AardvarkApi {
    open: OpenFn,
    close: HandleFn,
    configure: ConfigureFn,
    i2c_pullup: MaskFn,
    target_power: MaskFn,
    monitor_enable: HandleFn,
    monitor_disable: HandleFn,
    monitor_read: MonitorReadFn,
    async_poll: PollFn,
    // Keeps the function pointers above valid
    _library: Library,
}

/// # Safety
/// `T` must be the function pointer type the library exports under `name`.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> anyhow::Result<T> {
    let symbol = library
        .get::<T>(format!("{}\0", name).as_bytes())
        .with_context(|| format!("Aardvark library has no symbol {}", name))?;
    Ok(*symbol)
}

impl AardvarkApi {
    /// Load the vendor library and resolve the monitor functions
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        log::debug!("Loading Aardvark library: {:?}", path);

        // SAFETY: loading runs the library's initialisers; the vendor library
        // has none with preconditions.
        let library = unsafe { Library::new(path) }
            .with_context(|| format!("Failed to load Aardvark library: {:?}", path))?;

        // SAFETY: signatures follow the vendor's C header.
        unsafe {
            Ok(Self {
                open: symbol(&library, "c_aa_open")?,
                close: symbol(&library, "c_aa_close")?,
                configure: symbol(&library, "c_aa_configure")?,
                i2c_pullup: symbol(&library, "c_aa_i2c_pullup")?,
                target_power: symbol(&library, "c_aa_target_power")?,
                monitor_enable: symbol(&library, "c_aa_i2c_monitor_enable")?,
                monitor_disable: symbol(&library, "c_aa_i2c_monitor_disable")?,
                monitor_read: symbol(&library, "c_aa_i2c_monitor_read")?,
                async_poll: symbol(&library, "c_aa_async_poll")?,
                _library: library,
            })
        }
    }
}

/// Adapter settings applied before monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterOptions {
    pub i2c_pullups: bool,
    pub target_power: bool,
}

/// An open Aardvark adapter; closed when dropped
pub struct Aardvark {
    api: AardvarkApi,
    handle: c_int,
    port: u16,
}

impl Aardvark {
    /// Open the adapter on `port`
    pub fn open(api: AardvarkApi, port: u16) -> anyhow::Result<Self> {
        // SAFETY: open takes a plain port number and returns a handle or a status.
        let handle = unsafe { (api.open)(c_int::from(port)) };
        if handle <= 0 {
            bail!(
                "Unable to open Aardvark device on port {}\nError code = {} ({})",
                port,
                handle,
                status_string(handle)
            );
        }

        log::info!("Opened Aardvark on port {} (handle {})", port, handle);
        Ok(Self { api, handle, port })
    }

    /// Enable the I2C subsystem and set pull-ups and target power
    pub fn configure(&mut self, options: &AdapterOptions) -> Result<()> {
        // SAFETY: the handle came from a successful open and is not closed until drop.
        check("configure", unsafe {
            (self.api.configure)(self.handle, AA_CONFIG_SPI_I2C)
        })?;

        // Pull-ups and power pins only exist on v2.0 hardware or newer, so
        // a failure here is not fatal.
        let pullups = if options.i2c_pullups { AA_I2C_PULLUP_BOTH } else { AA_I2C_PULLUP_NONE };
        // SAFETY: the handle came from a successful open and is not closed until drop.
        let status = unsafe { (self.api.i2c_pullup)(self.handle, pullups) };
        if status < 0 {
            log::warn!("Could not set I2C pull-ups: {}", status_string(status));
        }

        let power = if options.target_power { AA_TARGET_POWER_BOTH } else { AA_TARGET_POWER_NONE };
        // SAFETY: the handle came from a successful open and is not closed until drop.
        let status = unsafe { (self.api.target_power)(self.handle, power) };
        if status < 0 {
            log::warn!("Could not set target power: {}", status_string(status));
        }

        log::debug!("Configured Aardvark on port {}: {:?}", self.port, options);
        Ok(())
    }
}

impl MonitorDevice for Aardvark {
    fn enable_monitor(&mut self) -> Result<()> {
        // SAFETY: the handle came from a successful open and is not closed until drop.
        check("monitor enable", unsafe { (self.api.monitor_enable)(self.handle) })?;
        Ok(())
    }

    fn disable_monitor(&mut self) -> Result<()> {
        // SAFETY: the handle came from a successful open and is not closed until drop.
        check("monitor disable", unsafe { (self.api.monitor_disable)(self.handle) })?;
        Ok(())
    }

    fn poll(&mut self, timeout_ms: u32) -> Result<bool> {
        let timeout = c_int::try_from(timeout_ms).unwrap_or(c_int::MAX);
        // SAFETY: the handle came from a successful open and is not closed until drop.
        let result = check("poll", unsafe { (self.api.async_poll)(self.handle, timeout) })?;
        Ok(result != AA_ASYNC_NO_DATA)
    }

    fn read_events(&mut self, max_events: u16) -> Result<Vec<u16>> {
        let mut buffer = vec![0u16; max_events as usize];
        // SAFETY: buffer holds max_events entries and the adapter writes at most num_data.
        let count = check("monitor read", unsafe {
            (self.api.monitor_read)(self.handle, max_events, buffer.as_mut_ptr())
        })?;
        buffer.truncate(count as usize);
        Ok(buffer)
    }
}

impl Drop for Aardvark {
    fn drop(&mut self) {
        // SAFETY: the handle is still open; drop runs at most once.
        let status = unsafe { (self.api.close)(self.handle) };
        if status < 0 {
            log::warn!("Failed to close Aardvark on port {}: {}", self.port, status_string(status));
        } else {
            log::debug!("Closed Aardvark on port {}", self.port);
        }
    }
}
