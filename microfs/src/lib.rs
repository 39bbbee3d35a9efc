//! # microfs
//!
//! A library for managing files on a BBC micro:bit running MicroPython.
//!
//! The device has no file transfer protocol of its own. Everything here is
//! done by driving the MicroPython REPL over the USB serial link:
//!
//! - Raw REPL handshake and command execution
//! - Listing, deleting, uploading and downloading files
//! - Normalizing device tracebacks into one-line errors
//! - Discovering the micro:bit among the host's serial ports
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use microfs::{NativeConnector, Session, fs};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = NativeConnector::new();
//!
//!     // One-shot: opens the device and closes it again
//!     fs::put(None, &connector, Path::new("main.py"), None)?;
//!
//!     // Several operations over one open session
//!     let mut session = Session::connect(&connector)?;
//!     for name in fs::ls(Some(&mut session), &connector)? {
//!         println!("{name}");
//!     }
//!     session.close()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod device;
pub mod error;
pub mod fs;
pub mod port;
pub mod protocol;
pub mod session;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
#[cfg(feature = "native")]
pub use session::NativeConnector;
pub use {
    clock::{Clock, Deadline, RetryPolicy, SystemClock},
    device::{DetectedPort, DeviceKind, detect_ports, find_microbit},
    error::{Error, GENERIC_ERROR_MESSAGE, Result, clean_error},
    fs::DeviceVersion,
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{ExecOutput, RawReplConfig, ReplMode},
    session::{Connector, Session, execute, with_session},
};
