//! Device discovery and classification utilities.
//!
//! The micro:bit enumerates as an ARM mbed CMSIS-DAP interface whose USB
//! serial bridge carries VID `0x0D28` and PID `0x0204`. Discovery lists the
//! serial ports visible to the host and picks the one carrying that pair.

use crate::port::PortInfo;

#[cfg(feature = "native")]
use log::{debug, trace};

/// USB vendor ID of the micro:bit's interface chip (ARM mbed).
pub const MICROBIT_VID: u16 = 0x0D28;

/// USB product ID of the micro:bit's CMSIS-DAP serial bridge.
pub const MICROBIT_PID: u16 = 0x0204;

/// Classified kind of a discovered serial endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    /// BBC micro:bit (mbed CMSIS-DAP serial bridge).
    Microbit,
    /// Anything else.
    Unknown,
}

impl DeviceKind {
    /// Classify a VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        if vid == MICROBIT_VID && pid == MICROBIT_PID {
            Self::Microbit
        } else {
            Self::Unknown
        }
    }

    /// Get a human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Microbit => "micro:bit",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is the device we can talk to.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Discovered serial endpoint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectedPort {
    /// Endpoint name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// Classified device kind.
    pub device: DeviceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl From<PortInfo> for DetectedPort {
    fn from(info: PortInfo) -> Self {
        let device = match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => DeviceKind::from_vid_pid(vid, pid),
            _ => DeviceKind::Unknown,
        };
        Self {
            name: info.name,
            device,
            vid: info.vid,
            pid: info.pid,
            manufacturer: info.manufacturer,
            product: info.product,
            serial: info.serial_number,
        }
    }
}

impl DetectedPort {
    /// Check if this endpoint is a micro:bit.
    pub fn is_microbit(&self) -> bool {
        self.device == DeviceKind::Microbit
    }

    /// Hardware ID in the `VID:PID=XXXX:XXXX SER=...` form used by most
    /// serial tooling.
    pub fn hardware_id(&self) -> Option<String> {
        let (vid, pid) = (self.vid?, self.pid?);
        let mut id = format!("USB VID:PID={vid:04X}:{pid:04X}");
        if let Some(serial) = &self.serial {
            id.push_str(" SER=");
            id.push_str(serial);
        }
        Some(id)
    }
}

/// Pick the micro:bit out of a list of endpoints.
///
/// Returns the first matching endpoint, or `None` when no device matches.
pub fn find_microbit(ports: &[DetectedPort]) -> Option<&DetectedPort> {
    ports.iter().find(|p| p.is_microbit())
}

/// Detect all available endpoints with metadata.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    use crate::port::{NativePortEnumerator, PortEnumerator};

    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|info| {
                let detected = DetectedPort::from(info);
                trace!(
                    "Found port: {} (VID: {:?}, PID: {:?}, Device: {:?})",
                    detected.name, detected.vid, detected.pid, detected.device
                );
                detected
            })
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Detect all available endpoints (no native support - always empty).
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}
