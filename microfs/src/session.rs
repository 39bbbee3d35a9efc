//! Device sessions.
//!
//! A [`Session`] owns an open transport and the raw REPL state bound to it.
//! Callers that run several operations back to back keep one session open;
//! one-shot callers pass `None` and let [`with_session`] locate the device,
//! open it and close it again afterwards.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{ExecOutput, RawRepl, RawReplConfig, ReplMode};
use log::{debug, info, warn};
use std::sync::Arc;

#[cfg(feature = "native")]
use crate::{device, port::SerialConfig};

/// Finds and opens the transport for a device.
pub trait Connector {
    /// Transport produced by [`Connector::open`].
    type Port: Port;

    /// Name of the port the device is attached to, if one is attached.
    fn locate(&self) -> Result<Option<String>>;

    /// Open the named port.
    fn open(&self, port_name: &str) -> Result<Self::Port>;

    /// Raw REPL settings for sessions opened through this connector.
    fn repl_config(&self) -> RawReplConfig {
        RawReplConfig::default()
    }
}

/// [`Connector`] over the host's serial ports.
///
/// Without an explicit port name the first micro:bit found by USB
/// identifiers is used.
#[cfg(feature = "native")]
#[derive(Debug, Clone, Default)]
pub struct NativeConnector {
    serial: SerialConfig,
    repl: RawReplConfig,
}

#[cfg(feature = "native")]
impl NativeConnector {
    /// Connector that discovers the device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed port instead of discovery.
    #[must_use]
    pub fn with_port(mut self, port_name: impl Into<String>) -> Self {
        self.serial.port_name = port_name.into();
        self
    }

    /// Replace the raw REPL settings.
    #[must_use]
    pub fn with_repl_config(mut self, repl: RawReplConfig) -> Self {
        self.repl = repl;
        self
    }
}

#[cfg(feature = "native")]
impl Connector for NativeConnector {
    type Port = crate::port::NativePort;

    fn locate(&self) -> Result<Option<String>> {
        if !self.serial.port_name.is_empty() {
            return Ok(Some(self.serial.port_name.clone()));
        }
        let ports = device::detect_ports();
        Ok(device::find_microbit(&ports).map(|p| p.name.clone()))
    }

    fn open(&self, port_name: &str) -> Result<Self::Port> {
        let mut config = self.serial.clone();
        config.port_name = port_name.to_string();
        crate::port::NativePort::open(&config)
    }

    fn repl_config(&self) -> RawReplConfig {
        self.repl.clone()
    }
}

/// An open connection to a device running MicroPython.
pub struct Session<P: Port> {
    repl: RawRepl<P>,
    closed: bool,
}

impl<P: Port> Session<P> {
    /// Wrap an already open transport.
    pub fn new(port: P) -> Self {
        Self {
            repl: RawRepl::new(port),
            closed: false,
        }
    }

    /// Locate and open a device through `connector`.
    pub fn connect<C>(connector: &C) -> Result<Self>
    where
        C: Connector<Port = P>,
    {
        let Some(name) = connector.locate()? else {
            return Err(Error::DeviceNotFound);
        };
        info!("Connecting to {name}");
        let port = connector.open(&name)?;
        Ok(Self::new(port).with_config(connector.repl_config()))
    }

    /// Replace the raw REPL settings.
    #[must_use]
    pub fn with_config(mut self, config: RawReplConfig) -> Self {
        self.repl.set_config(config);
        self
    }

    /// Replace the clock used for timeouts and pacing.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.repl.set_clock(clock);
        self
    }

    /// Current REPL mode.
    pub fn mode(&self) -> ReplMode {
        self.repl.mode()
    }

    /// Run a command batch.
    ///
    /// On failure the device is sent back to the friendly REPL before the
    /// error or the stderr output is handed to the caller.
    pub fn execute<S: AsRef<str>>(&mut self, statements: &[S]) -> Result<ExecOutput> {
        self.execute_with_progress(statements, &mut |_, _| {})
    }

    /// Like [`Session::execute`], reporting `(done, total)` statements.
    pub fn execute_with_progress<S: AsRef<str>>(
        &mut self,
        statements: &[S],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<ExecOutput> {
        let result = self
            .repl
            .execute_with_progress(statements, progress);

        let failed = match &result {
            Ok(output) => output.is_err(),
            Err(_) => true,
        };
        if failed && self.repl.mode() == ReplMode::Raw {
            if let Err(e) = self.repl.exit() {
                warn!("Failed to leave raw REPL: {e}");
            }
        }
        result
    }

    /// Leave raw mode if needed and close the transport.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.repl.mode() == ReplMode::Raw {
            if let Err(e) = self.repl.exit() {
                warn!("Failed to leave raw REPL: {e}");
            }
        }
        debug!("Closing {}", self.repl.port().name());
        self.repl.port_mut().close()
    }
}

impl<P: Port> Drop for Session<P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("Error while closing session: {e}");
        }
    }
}

/// Run `f` against `session`, or against a fresh session from `connector`
/// that is closed again before returning.
pub fn with_session<C, T, F>(
    session: Option<&mut Session<C::Port>>,
    connector: &C,
    f: F,
) -> Result<T>
where
    C: Connector,
    F: FnOnce(&mut Session<C::Port>) -> Result<T>,
{
    if let Some(session) = session {
        return f(session);
    }

    let mut session = Session::connect(connector)?;
    let result = f(&mut session);
    let closed = session.close();
    let value = result?;
    closed?;
    Ok(value)
}

/// Execute a command batch on the given session or a temporary one.
pub fn execute<C, S>(
    statements: &[S],
    session: Option<&mut Session<C::Port>>,
    connector: &C,
) -> Result<ExecOutput>
where
    C: Connector,
    S: AsRef<str>,
{
    with_session(session, connector, |s| s.execute(statements))
}
