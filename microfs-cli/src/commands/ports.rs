//! List ports command.

use anyhow::Result;
use console::style;
use microfs::{DetectedPort, detect_ports, find_microbit};

fn port_json(port: &DetectedPort) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "device": port.device.name(),
        "microbit": port.is_microbit(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
        "hwid": port.hardware_id(),
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(port_json)
            .collect();
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };

        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            device_type,
            vid_pid,
            product
        );
    }

    if let Some(microbit) = find_microbit(&detected) {
        eprintln!(
            "\n{} micro:bit found on {}",
            style("→").green().bold(),
            style(&microbit.name).cyan().bold()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use microfs::PortInfo;

    #[test]
    fn test_port_json_fields() {
        let port = DetectedPort::from(PortInfo {
            name: "/dev/ttyACM0".to_string(),
            vid: Some(0x0D28),
            pid: Some(0x0204),
            manufacturer: Some("ARM".to_string()),
            product: Some("DAPLink CMSIS-DAP".to_string()),
            serial_number: Some("9900".to_string()),
        });

        let value = port_json(&port);
        assert_eq!(value["name"], "/dev/ttyACM0");
        assert_eq!(value["device"], "micro:bit");
        assert_eq!(value["microbit"], true);
        assert_eq!(value["vid"], 0x0D28);
        assert_eq!(value["hwid"], "USB VID:PID=0D28:0204 SER=9900");
    }

    #[test]
    fn test_port_json_without_usb_info() {
        let port = DetectedPort::from(PortInfo {
            name: "/dev/ttyS0".to_string(),
            ..PortInfo::default()
        });

        let value = port_json(&port);
        assert_eq!(value["microbit"], false);
        assert!(value["vid"].is_null());
        assert!(value["hwid"].is_null());
    }
}
