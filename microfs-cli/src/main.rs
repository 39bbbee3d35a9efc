//! ufs - Command-line tool for the filesystem of a BBC micro:bit.
//!
//! ## Features
//!
//! - List, delete, upload and download files on a micro:bit running MicroPython
//! - Automatic detection of the micro:bit serial port
//! - Configuration files and environment variable support
//! - Shell completion generation

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use microfs::{NativeConnector, RawReplConfig};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if spinners and progress bars should be drawn.
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Errors raised by the CLI itself rather than by the device.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// The command line was well formed but its values are not usable.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
        }
    }
}

/// ufs - Manage the files on a BBC micro:bit running MicroPython.
///
/// Environment variables:
///   UFS_PORT     - Serial port to use instead of auto-detection
///   UFS_TIMEOUT  - Statement timeout in milliseconds (default: 10000)
#[derive(Parser)]
#[command(name = "ufs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "UFS_PORT")]
    port: Option<String>,

    /// How long a statement may run on the device, in milliseconds.
    #[arg(long, global = true, env = "UFS_TIMEOUT", value_name = "MS")]
    timeout: Option<u64>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List the files on the device.
    Ls {
        /// Output the file names as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Delete a file from the device.
    Rm {
        /// Name of the file on the device.
        path: String,
    },

    /// Copy a local file to the device.
    Put {
        /// Local file to upload.
        path: PathBuf,

        /// Name on the device (defaults to the local file name).
        target: Option<String>,
    },

    /// Copy a file from the device.
    Get {
        /// Name of the file on the device.
        path: String,

        /// Local destination (defaults to the device file name).
        target: Option<PathBuf>,
    },

    /// Show the MicroPython version running on the device.
    Version {
        /// Output version information as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // An unknown command is answered with the help text, not an error
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => {
            print_help();
            return ExitCode::SUCCESS;
        },
        Err(e) => e.exit(),
    };

    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(
                err.downcast_ref::<CliError>()
                    .map_or(1, CliError::exit_code),
            )
        },
    }
}

fn print_help() {
    let _ = Cli::command().print_help();
    println!();
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "ufs v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );
}

fn run(cli: &Cli) -> Result<()> {
    let Some(command) = &cli.command else {
        print_help();
        return Ok(());
    };

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match command {
        Commands::Ls { json } => commands::fs::cmd_ls(&connector(cli, &config)?, *json),
        Commands::Rm { path } => commands::fs::cmd_rm(&connector(cli, &config)?, path, cli.quiet),
        Commands::Put { path, target } => commands::fs::cmd_put(
            &connector(cli, &config)?,
            path,
            target.as_deref(),
            cli.quiet,
        ),
        Commands::Get { path, target } => commands::fs::cmd_get(
            &connector(cli, &config)?,
            path,
            target.as_deref(),
            cli.quiet,
        ),
        Commands::Version { json } => commands::fs::cmd_version(&connector(cli, &config)?, *json),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Build the device connector from the command line and config files.
fn connector(cli: &Cli, config: &Config) -> Result<NativeConnector> {
    let mut connector = NativeConnector::new();
    if let Some(port) = cli
        .port
        .as_ref()
        .or(config.connection.port.as_ref())
    {
        debug!("Using port {port}");
        connector = connector.with_port(port.clone());
    }

    let mut repl = RawReplConfig::default();
    if let Some(ms) = cli.timeout.or(config.connection.timeout_ms) {
        if ms == 0 {
            return Err(CliError::Usage("timeout must be greater than zero".to_string()).into());
        }
        repl = repl.with_response_timeout(Duration::from_millis(ms));
    }
    if let Some(attempts) = config.repl.handshake_attempts {
        repl = repl.with_handshake_attempts(attempts);
    }

    Ok(connector.with_repl_config(repl))
}
