//! Port abstraction for serial communication.
//!
//! The raw REPL driver only needs a duplex byte stream whose reads return
//! after a bounded timeout. That is captured by the [`Port`] trait so the
//! protocol layer can run against the native `serialport` implementation or
//! against an in-memory fake in tests.
//!
//! ```text
//! +------------------+
//! |   Filesystem ops |   ls / rm / put / get
//! +--------+---------+
//!          |
//! +--------+---------+
//! |    Raw REPL      |   handshake + command executor
//! +--------+---------+
//!          |
//! +--------+---------+
//! |   Port Trait     |
//! +--------+---------+
//!          |
//! +--------+---------+
//! | Native SerialPort|
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use microfs::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> std::io::Result<()> {
//!     port.write_all(b"\x03")?;
//!
//!     let mut buf = [0u8; 32];
//!     let n = port.read(&mut buf)?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate used by the micro:bit USB serial bridge.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial port configuration.
///
/// The line is always 8 data bits, no parity, one stop bit.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Timeout of a single read call.
    ///
    /// This bounds how long one poll of the port blocks, not how long a
    /// command may take; see [`crate::protocol::RawReplConfig`] for that.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(100),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration for the given port at the default baud rate.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }

}

/// Serial port information as reported by the operating system.
#[derive(Debug, Clone, Default)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Byte-oriented duplex connection to the device.
///
/// `read` must return within the configured timeout, either with data or
/// with an error of kind [`std::io::ErrorKind::TimedOut`] (returning `Ok(0)`
/// is treated the same way).
pub trait Port: Read + Write + Send {
    /// Discard any bytes buffered in either direction.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
