//! MicroPython raw REPL driver.
//!
//! The friendly REPL echoes and line-edits everything it receives, which
//! makes it useless for sending programs. Raw mode instead buffers source
//! text until `Ctrl-D` and then answers with a framed response:
//!
//! ```text
//! host:   <source text> 0x04
//! device: "OK" <stdout> 0x04 <stderr> 0x04 ">"
//! ```
//!
//! ## Handshake
//!
//! ```text
//! host -> 0x03            (interrupt, repeated until "\n>>>" is seen)
//! host -> 0x01            (enter raw mode)
//! device <- "raw REPL; CTRL-B to exit\r\n>"
//! ...statements...
//! host -> 0x02            (back to the friendly REPL, not confirmed)
//! ```

use crate::clock::{Clock, Deadline, RetryPolicy, SystemClock};
use crate::error::{Error, Result};
use crate::port::Port;
use log::{debug, trace, warn};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

/// Raw REPL control bytes and delimiters.
pub mod control {
    /// Ctrl-C: interrupt the running program.
    pub const INTERRUPT: u8 = 0x03;
    /// Ctrl-A: enter raw mode.
    pub const ENTER_RAW: u8 = 0x01;
    /// Ctrl-B: leave raw mode.
    pub const EXIT_RAW: u8 = 0x02;
    /// Ctrl-D: evaluate the buffered statement.
    pub const EVALUATE: u8 = 0x04;
    /// Separates stdout from stderr in a response.
    pub const SEPARATOR: u8 = 0x04;
    /// Status that starts every raw mode response.
    pub const STATUS_OK: &[u8] = b"OK";
    /// Tail of a complete raw mode response.
    pub const END_OF_OUTPUT: &[u8] = b"\x04>";
    /// Tail of the friendly REPL prompt.
    pub const INTERACTIVE_PROMPT: &[u8] = b"\n>>>";
    /// Banner printed when raw mode is entered.
    pub const RAW_PROMPT: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";
}

/// Largest fragment written to the device in one go.
pub const WRITE_CHUNK_SIZE: usize = 32;

/// REPL state as far as the host knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplMode {
    /// Nothing has been exchanged yet.
    #[default]
    Unknown,
    /// Friendly, line-editing REPL.
    Interactive,
    /// Raw, buffered execution mode.
    Raw,
}

/// Raw REPL tuning.
#[derive(Debug, Clone)]
pub struct RawReplConfig {
    /// Attempts for each handshake phase.
    pub handshake: RetryPolicy,
    /// How long one handshake attempt waits for its prompt.
    pub prompt_timeout: Duration,
    /// How long a statement may take to produce its complete response.
    pub response_timeout: Duration,
    /// Size of each written fragment.
    pub write_chunk: usize,
    /// Pause after each written fragment.
    pub write_delay: Duration,
    /// Pause after a read that returned nothing.
    pub poll_interval: Duration,
}

impl Default for RawReplConfig {
    fn default() -> Self {
        Self {
            handshake: RetryPolicy::new(3),
            prompt_timeout: Duration::from_secs(1),
            response_timeout: Duration::from_secs(10),
            write_chunk: WRITE_CHUNK_SIZE,
            write_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl RawReplConfig {
    /// Set the per-statement response deadline.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the number of attempts for each handshake phase.
    #[must_use]
    pub fn with_handshake_attempts(mut self, attempts: usize) -> Self {
        self.handshake.max_attempts = attempts.max(1);
        self
    }
}

/// Output of a command batch.
///
/// A non-empty `stderr` means the batch failed and `stdout` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Concatenated stdout of every statement, in order.
    pub stdout: Vec<u8>,
    /// stderr of the statement that failed.
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    /// Whether the device reported an error.
    pub fn is_err(&self) -> bool {
        !self.stderr.is_empty()
    }

    /// Convert into stdout, or a [`Error::RemoteFile`] carrying the
    /// normalized stderr.
    pub fn into_stdout(self) -> Result<Vec<u8>> {
        if self.is_err() {
            Err(Error::remote(&self.stderr))
        } else {
            Ok(self.stdout)
        }
    }
}

/// Raw REPL driver over a [`Port`].
pub struct RawRepl<P: Port> {
    port: P,
    config: RawReplConfig,
    clock: Arc<dyn Clock>,
    mode: ReplMode,
    /// Bytes read past the last delimiter.
    pending: Vec<u8>,
}

impl<P: Port> RawRepl<P> {
    /// Create a driver with default configuration and the system clock.
    pub fn new(port: P) -> Self {
        Self {
            port,
            config: RawReplConfig::default(),
            clock: Arc::new(SystemClock),
            mode: ReplMode::Unknown,
            pending: Vec::new(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RawReplConfig) -> Self {
        self.set_config(config);
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.set_clock(clock);
        self
    }

    /// Replace the configuration in place.
    pub fn set_config(&mut self, config: RawReplConfig) {
        self.config = config;
    }

    /// Replace the clock in place.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Current REPL mode.
    pub fn mode(&self) -> ReplMode {
        self.mode
    }

    /// Active configuration.
    pub fn config(&self) -> &RawReplConfig {
        &self.config
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Put the device into raw mode.
    pub fn enter(&mut self) -> Result<()> {
        debug!("Entering raw REPL on {}", self.port.name());

        self.port.clear_buffers()?;
        self.pending.clear();

        // A previous session may have abandoned the device in raw mode
        if self.mode != ReplMode::Interactive {
            self.port.write_all_bytes(&[control::EXIT_RAW])?;
        }

        let policy = self.config.handshake;
        let clock = Arc::clone(&self.clock);

        let interactive = policy.run(clock.as_ref(), |attempt| {
            trace!("Sending interrupt (attempt {attempt})");
            self.port.write_all_bytes(&[control::INTERRUPT])?;
            self.scan_for(control::INTERACTIVE_PROMPT)
        })?;
        if interactive.is_none() {
            warn!("No interactive prompt after {} attempts", policy.max_attempts);
            return Err(Error::Protocol("could not enter raw REPL".into()));
        }
        self.mode = ReplMode::Interactive;

        let raw = policy.run(clock.as_ref(), |attempt| {
            trace!("Requesting raw mode (attempt {attempt})");
            self.port.write_all_bytes(&[control::ENTER_RAW])?;
            self.scan_for(control::RAW_PROMPT)
        })?;
        if raw.is_none() {
            warn!("No raw REPL prompt after {} attempts", policy.max_attempts);
            return Err(Error::Protocol("could not enter raw REPL".into()));
        }
        self.mode = ReplMode::Raw;

        debug!("Raw REPL ready");
        Ok(())
    }

    /// Return the device to the friendly REPL.
    pub fn exit(&mut self) -> Result<()> {
        debug!("Leaving raw REPL");
        self.port.write_all_bytes(&[control::EXIT_RAW])?;
        self.mode = ReplMode::Interactive;
        Ok(())
    }

    /// Execute a command batch in a single raw mode excursion.
    ///
    /// Stops at the first statement that writes to stderr, leaving the
    /// device in raw mode; the caller decides how to leave it.
    pub fn execute<S: AsRef<str>>(&mut self, statements: &[S]) -> Result<ExecOutput> {
        self.execute_with_progress(statements, &mut |_, _| {})
    }

    /// Like [`RawRepl::execute`], calling `progress(done, total)` after each
    /// statement completes.
    pub fn execute_with_progress<S: AsRef<str>>(
        &mut self,
        statements: &[S],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<ExecOutput> {
        self.enter()?;

        let total = statements.len();
        let mut stdout = Vec::new();
        for (index, statement) in statements.iter().enumerate() {
            let (out, err) = self.run_statement(statement.as_ref())?;
            if !err.is_empty() {
                debug!(
                    "Statement {}/{} failed: {}",
                    index + 1,
                    total,
                    String::from_utf8_lossy(&err).trim_end()
                );
                return Ok(ExecOutput {
                    stdout: Vec::new(),
                    stderr: err,
                });
            }
            stdout.extend_from_slice(&out);
            progress(index + 1, total);
        }

        self.exit()?;
        Ok(ExecOutput {
            stdout,
            stderr: Vec::new(),
        })
    }

    /// Send one statement and wait for its framed response.
    fn run_statement(&mut self, statement: &str) -> Result<(Vec<u8>, Vec<u8>)> {
        trace!("Executing: {statement:?}");

        for fragment in statement
            .as_bytes()
            .chunks(self.config.write_chunk.max(1))
        {
            self.port.write_all_bytes(fragment)?;
            self.clock.sleep(self.config.write_delay);
        }
        self.port.write_all_bytes(&[control::EVALUATE])?;

        let deadline = Deadline::after(self.clock.as_ref(), self.config.response_timeout);
        loop {
            if let Some(response) = self.take_response()? {
                return Ok(response);
            }
            if deadline.expired(self.clock.as_ref()) {
                return Err(Error::Protocol(format!(
                    "no response from device within {:?}",
                    self.config.response_timeout
                )));
            }
            self.fill()?;
        }
    }

    /// Split a complete response out of the pending buffer.
    fn take_response(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if !self.pending.ends_with(control::END_OF_OUTPUT) {
            return Ok(None);
        }

        let Some(start) = find(&self.pending, control::STATUS_OK) else {
            return Err(Error::Protocol(format!(
                "response without OK status: {:?}",
                String::from_utf8_lossy(&self.pending)
            )));
        };
        if start > 0 {
            trace!("Skipping {start} stale bytes before response");
        }

        let body_start = start + control::STATUS_OK.len();
        let body_end = self.pending.len() - control::END_OF_OUTPUT.len();
        let Some(body) = self.pending.get(body_start..body_end) else {
            return Ok(None);
        };
        // Only the stderr terminator has arrived so far
        let Some(split) = body.iter().position(|&b| b == control::SEPARATOR) else {
            return Ok(None);
        };

        let out = body[..split].to_vec();
        let err = body[split + 1..].to_vec();
        self.pending.clear();
        Ok(Some((out, err)))
    }

    /// Read until `delimiter` shows up or the prompt timeout elapses.
    fn scan_for(&mut self, delimiter: &[u8]) -> Result<Option<()>> {
        let deadline = Deadline::after(self.clock.as_ref(), self.config.prompt_timeout);
        loop {
            if let Some(pos) = find(&self.pending, delimiter) {
                self.pending.drain(..pos + delimiter.len());
                return Ok(Some(()));
            }
            if deadline.expired(self.clock.as_ref()) {
                trace!(
                    "Delimiter {:?} not seen, got {:?}",
                    String::from_utf8_lossy(delimiter),
                    String::from_utf8_lossy(&self.pending)
                );
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// Append whatever the port has to the pending buffer.
    fn fill(&mut self) -> Result<()> {
        let mut buf = [0u8; 256];
        match self.port.read(&mut buf) {
            Ok(0) => self.clock.sleep(self.config.poll_interval),
            Ok(n) => {
                trace!("Received {n} bytes");
                self.pending.extend_from_slice(&buf[..n]);
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                self.clock.sleep(self.config.poll_interval);
            },
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(Error::Io(e)),
        }
        Ok(())
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}
