//! Error types for microfs.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for microfs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message used when the device reports a failure without any stderr text.
pub const GENERIC_ERROR_MESSAGE: &str = "There was an error.";

/// Error type for microfs operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No serial port matched the device's USB identifiers.
    #[error("Could not find micro:bit.")]
    DeviceNotFound,

    /// The REPL did not behave as the raw-mode protocol expects.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A local file could not be read or written.
    #[error("{message}: {}", path.display())]
    LocalFile {
        /// Human readable reason.
        message: String,
        /// Path of the local file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The device reported an error on stderr.
    #[error("{0}")]
    RemoteFile(String),
}

impl Error {
    /// Build a [`Error::RemoteFile`] from raw stderr bytes.
    pub fn remote(stderr: &[u8]) -> Self {
        Self::RemoteFile(clean_error(stderr))
    }

    pub(crate) fn local(
        message: impl Into<String>,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::LocalFile {
            message: message.into(),
            path: path.into(),
            source,
        }
    }
}

/// Reduce a MicroPython traceback to the single line that names the error.
///
/// Tracebacks end with `\r\n`, so the informative line is the second to
/// last element after splitting. Anything that does not look like that is
/// returned as decoded text.
pub fn clean_error(stderr: &[u8]) -> String {
    if stderr.is_empty() {
        return GENERIC_ERROR_MESSAGE.to_string();
    }

    let decoded = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = decoded.split("\r\n").collect();
    match lines.len().checked_sub(2).and_then(|i| lines.get(i)) {
        Some(line) => (*line).to_string(),
        None => decoded.into_owned(),
    }
}
