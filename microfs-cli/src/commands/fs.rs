//! File commands: ls, rm, put, get, version.

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use microfs::{NativeConnector, fs};
use std::path::Path;
use std::time::Duration;

use crate::use_fancy_output;

/// Progress bar counting upload statements.
fn transfer_bar(quiet: bool, message: String) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(bar_style.progress_chars("#>-"));
    }
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb.set_message(message);
    pb
}

/// Spinner for operations without measurable progress.
fn spinner(quiet: bool, message: String) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// List the files on the device.
pub(crate) fn cmd_ls(connector: &NativeConnector, json: bool) -> Result<()> {
    let names = fs::ls(None, connector)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if !names.is_empty() {
        println!("{}", names.join(" "));
    }
    Ok(())
}

/// Delete a file from the device.
pub(crate) fn cmd_rm(connector: &NativeConnector, path: &str, quiet: bool) -> Result<()> {
    fs::rm(None, connector, path)?;

    if !quiet {
        eprintln!("{} Removed {}", style("✓").green(), style(path).cyan());
    }
    Ok(())
}

/// Copy a local file to the device.
pub(crate) fn cmd_put(
    connector: &NativeConnector,
    path: &Path,
    target: Option<&str>,
    quiet: bool,
) -> Result<()> {
    // Local problems are reported before the device is touched
    let (target, content) = fs::read_local(path, target)?;

    let pb = transfer_bar(quiet, target.clone());
    let result = fs::put_bytes(None, connector, &target, &content, &mut |done, total| {
        pb.set_length(u64::try_from(total).unwrap_or(u64::MAX));
        pb.set_position(u64::try_from(done).unwrap_or(u64::MAX));
    });
    pb.finish_and_clear();
    result?;

    if !quiet {
        eprintln!(
            "{} {} -> {} ({} bytes)",
            style("✓").green(),
            path.display(),
            style(&target).cyan(),
            content.len()
        );
    }
    Ok(())
}

/// Copy a file from the device.
pub(crate) fn cmd_get(
    connector: &NativeConnector,
    path: &str,
    target: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let pb = spinner(quiet, format!("Reading {path}"));
    let result = fs::get(None, connector, path, target);
    pb.finish_and_clear();
    let written = result?;

    if !quiet {
        eprintln!(
            "{} {} -> {}",
            style("✓").green(),
            style(path).cyan(),
            written.display()
        );
    }
    Ok(())
}

/// Show the MicroPython version of the device.
pub(crate) fn cmd_version(connector: &NativeConnector, json: bool) -> Result<()> {
    let version = fs::version(None, connector)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&version)?);
        return Ok(());
    }

    println!("sysname:  {}", version.sysname);
    println!("nodename: {}", version.nodename);
    println!("release:  {}", version.release);
    println!("version:  {}", version.version);
    println!("machine:  {}", version.machine);
    Ok(())
}
