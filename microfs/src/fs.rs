//! File operations on the device's flash filesystem.
//!
//! Every operation is a short MicroPython program run through
//! [`Session::execute`], either on the session passed in or on a temporary
//! one opened through the connector. File names and content travel as
//! literals built by [`crate::protocol::literal`], and content is split so
//! that no single statement grows past what the device can buffer.

use crate::error::{Error, Result};
use crate::protocol::literal;
use crate::session::{Connector, Session, with_session};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Bytes of file content per upload statement.
pub const PUT_CHUNK_SIZE: usize = 64;

/// Bytes of file content the device reads per loop iteration on download.
pub const GET_CHUNK_SIZE: usize = 32;

/// Binds `u` to a raw output stream: the micro:bit UART, a machine UART, or
/// stdout as a last resort.
const BIND_OUTPUT: &str = "try:\n from microbit import uart as u\nexcept ImportError:\n try:\n  from machine import UART\n  u = UART(0, 115200)\n except Exception:\n  try:\n   from sys import stdout as u\n  except Exception:\n   raise Exception('Could not find UART module in device.')";

/// Version information reported by `os.uname()`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceVersion {
    /// Operating system name.
    pub sysname: String,
    /// Network name of the board.
    pub nodename: String,
    /// Firmware release.
    pub release: String,
    /// Full firmware version string.
    pub version: String,
    /// Hardware description.
    pub machine: String,
}

impl DeviceVersion {
    /// Parse the printed form of `os.uname()`.
    pub fn parse(text: &str) -> Result<Self> {
        let fields = literal::parse_named_tuple(text)?;
        let field = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| Error::Protocol(format!("uname output is missing '{name}'")))
        };
        Ok(Self {
            sysname: field("sysname")?,
            nodename: field("nodename")?,
            release: field("release")?,
            version: field("version")?,
            machine: field("machine")?,
        })
    }
}

/// Statements that print the root directory listing.
pub fn ls_statements() -> Vec<String> {
    vec!["import os".into(), "print(os.listdir())".into()]
}

/// Statements that delete `name`.
pub fn rm_statements(name: &str) -> Vec<String> {
    vec![
        "import os".into(),
        format!("os.remove({})", literal::encode_str(name)),
    ]
}

/// Statements that write `content` to `target`.
pub fn put_statements(target: &str, content: &[u8]) -> Vec<String> {
    let mut statements = vec![
        format!("fd = open({}, 'wb')", literal::encode_str(target)),
        "f = fd.write".into(),
    ];
    statements.extend(
        content
            .chunks(PUT_CHUNK_SIZE)
            .map(|chunk| format!("f({})", literal::encode_bytes(chunk))),
    );
    statements.push("fd.close()".into());
    statements
}

/// Statements that echo the content of `name` as bytes literals.
pub fn get_statements(name: &str) -> Vec<String> {
    vec![
        BIND_OUTPUT.into(),
        format!("f = open({}, 'rb')", literal::encode_str(name)),
        "r = f.read".into(),
        "result = True".into(),
        format!(
            "while result:\n result = r({GET_CHUNK_SIZE})\n if result:\n  u.write(repr(result))\n"
        ),
        "f.close()".into(),
    ]
}

/// Statements that print `os.uname()`.
pub fn version_statements() -> Vec<String> {
    vec!["import os".into(), "print(os.uname())".into()]
}

/// List the files on the device.
pub fn ls<C: Connector>(
    session: Option<&mut Session<C::Port>>,
    connector: &C,
) -> Result<Vec<String>> {
    let stdout = with_session(session, connector, |s| s.execute(&ls_statements()))?
        .into_stdout()?;
    literal::parse_str_list(&String::from_utf8_lossy(&stdout))
}

/// Delete `name` from the device.
pub fn rm<C: Connector>(
    session: Option<&mut Session<C::Port>>,
    connector: &C,
    name: &str,
) -> Result<()> {
    info!("Removing {name}");
    with_session(session, connector, |s| s.execute(&rm_statements(name)))?
        .into_stdout()?;
    Ok(())
}

/// Read a local file for upload.
///
/// Returns the remote name (`target`, or the file's base name) and the
/// content. Failing here never touches the device.
pub fn read_local(local: &Path, target: Option<&str>) -> Result<(String, Vec<u8>)> {
    let content = std::fs::read(local).map_err(|e| Error::local("Could not read file", local, e))?;
    let target = match target {
        Some(target) => target.to_string(),
        None => local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::local(
                    "No file name",
                    local,
                    std::io::Error::from(std::io::ErrorKind::InvalidInput),
                )
            })?,
    };
    Ok((target, content))
}

/// Copy a local file to the device.
///
/// The local file is read before a device is located or opened. Returns the
/// name the file was stored under.
pub fn put<C: Connector>(
    session: Option<&mut Session<C::Port>>,
    connector: &C,
    local: &Path,
    target: Option<&str>,
) -> Result<String> {
    let (target, content) = read_local(local, target)?;
    put_bytes(session, connector, &target, &content, &mut |_, _| {})?;
    Ok(target)
}

/// Write `content` to `target` on the device, reporting `(done, total)`
/// statements as they complete.
pub fn put_bytes<C: Connector>(
    session: Option<&mut Session<C::Port>>,
    connector: &C,
    target: &str,
    content: &[u8],
    progress: &mut dyn FnMut(usize, usize),
) -> Result<()> {
    let statements = put_statements(target, content);
    info!(
        "Writing {} bytes to {target} in {} chunks",
        content.len(),
        content.len().div_ceil(PUT_CHUNK_SIZE)
    );
    with_session(session, connector, |s| s.execute_with_progress(&statements, progress))?
        .into_stdout()?;
    Ok(())
}

/// Read `name` from the device.
pub fn get_bytes<C: Connector>(
    session: Option<&mut Session<C::Port>>,
    connector: &C,
    name: &str,
) -> Result<Vec<u8>> {
    let stdout = with_session(session, connector, |s| s.execute(&get_statements(name)))?
        .into_stdout()?;
    let content = literal::parse_bytes_concat(&String::from_utf8_lossy(&stdout))?;
    debug!("Read {} bytes from {name}", content.len());
    Ok(content)
}

/// Copy `name` from the device to `local` (default: `name` in the current
/// directory).
///
/// Returns the path written.
pub fn get<C: Connector>(
    session: Option<&mut Session<C::Port>>,
    connector: &C,
    name: &str,
    local: Option<&Path>,
) -> Result<PathBuf> {
    let target = local.map_or_else(|| PathBuf::from(name), Path::to_path_buf);
    let content = get_bytes(session, connector, name)?;
    std::fs::write(&target, &content).map_err(|e| Error::local("Could not write file", &target, e))?;
    info!("Saved {name} to {}", target.display());
    Ok(target)
}

/// Query the firmware version.
pub fn version<C: Connector>(
    session: Option<&mut Session<C::Port>>,
    connector: &C,
) -> Result<DeviceVersion> {
    let stdout = with_session(session, connector, |s| s.execute(&version_statements()))?
        .into_stdout()?;
    DeviceVersion::parse(&String::from_utf8_lossy(&stdout))
}
