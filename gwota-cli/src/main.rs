//! gwota CLI - Command-line tool for the gateway BLE OTA update engine.
//!
//! ## Features
//!
//! - Inspect firmware images: sector/chunk layout and per-sector CRCs
//! - Run the full OTA session against the built-in gateway emulator
//! - Inject device-side faults to exercise retry and rewind recovery
//! - Shell completion generation
//! - Environment variable support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use commands::completions::{cmd_completions, cmd_completions_install};
use commands::info::cmd_info;
use commands::upload::{FailKind, UploadOptions, cmd_upload};
use config::Config;

/// CLI-level error conditions with dedicated exit codes.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// The user cancelled a running upload (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// gwota - developer tool for the gateway BLE OTA update engine.
///
/// Environment variables:
///   GWOTA_SECTOR_SIZE   - Sector payload size in bytes (default: 4096)
///   GWOTA_RETRY_LIMIT   - Resend ceiling per sector (default: 50)
#[derive(Parser)]
#[command(name = "gwota")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "For more information, visit: https://github.com/gwota/gwota")]
struct Cli {
    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Show the upload plan for a firmware image.
    Info {
        /// Path to the firmware binary.
        firmware: PathBuf,

        /// Output the plan as JSON to stdout.
        #[arg(long)]
        json: bool,

        /// List every sector with its wire index and CRC.
        #[arg(long)]
        sectors: bool,

        /// Sector payload size in bytes.
        #[arg(long, env = "GWOTA_SECTOR_SIZE")]
        sector_size: Option<usize>,
    },

    /// Upload a firmware image to the built-in gateway emulator.
    Upload {
        /// Path to the firmware binary.
        firmware: PathBuf,

        /// Inject a device-side failure for this sector (zero-based).
        #[arg(long)]
        fail_sector: Option<usize>,

        /// Kind of failure injected with --fail-sector.
        #[arg(long, value_enum, default_value = "crc")]
        fail_kind: FailKind,

        /// How many times the injected failure repeats.
        #[arg(long, default_value_t = 1)]
        fail_times: u32,

        /// Demand a rewind after this sector is stored (zero-based).
        #[arg(long)]
        rewind_at: Option<usize>,

        /// Rewind target as reported by the device (1-based).
        #[arg(long, default_value_t = 1)]
        rewind_to: u16,

        /// Reject the START command.
        #[arg(long)]
        reject_start: bool,

        /// Swallow the START acknowledgment (forces an ack timeout).
        #[arg(long)]
        drop_start_ack: bool,

        /// Sector payload size in bytes.
        #[arg(long, env = "GWOTA_SECTOR_SIZE")]
        sector_size: Option<usize>,

        /// Resend ceiling per sector before the session fails.
        #[arg(long, env = "GWOTA_RETRY_LIMIT")]
        sector_retry_limit: Option<u32>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

fn main() {
    match run() {
        Ok(()) => {},
        Err(e) => {
            if let Some(CliError::Cancelled(msg)) = e.downcast_ref::<CliError>() {
                eprintln!("{} {msg}", style("⚠").yellow());
                std::process::exit(130);
            }
            eprintln!("{} {e:#}", style("Error:").red().bold());
            std::process::exit(1);
        },
    }
}

fn run() -> Result<()> {
    // --- NO_COLOR and TTY detection (clig.dev best practice) ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
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
        "gwota v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Info {
            firmware,
            json,
            sectors,
            sector_size,
        } => {
            let sector_size = sector_size
                .or(config.upload.sector_size)
                .unwrap_or(gwota::SECTOR_SIZE);
            cmd_info(firmware, sector_size, *json, *sectors)?;
        },
        Commands::Upload {
            firmware,
            fail_sector,
            fail_kind,
            fail_times,
            rewind_at,
            rewind_to,
            reject_start,
            drop_start_ack,
            sector_size,
            sector_retry_limit,
        } => {
            let options = UploadOptions {
                fail_sector: *fail_sector,
                fail_kind: *fail_kind,
                fail_times: *fail_times,
                rewind_at: *rewind_at,
                rewind_to: *rewind_to,
                reject_start: *reject_start,
                drop_start_ack: *drop_start_ack,
                sector_size: *sector_size,
                sector_retry_limit: *sector_retry_limit,
            };
            cmd_upload(&cli, &config, firmware, &options)?;
        },
        Commands::Completions { shell, install } => {
            if *install {
                cmd_completions_install(*shell)?;
            } else {
                let shell = shell.unwrap_or_else(|| {
                    eprintln!(
                        "{} specify a shell type, e.g.: gwota completions bash",
                        style("Error:").red().bold()
                    );
                    eprintln!(
                        "  Or use {} to auto-install completions.",
                        style("gwota completions --install").cyan()
                    );
                    std::process::exit(1);
                });
                cmd_completions(shell);
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        // Verifies that all derive macros produce a valid clap Command
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_info() {
        let cli = Cli::try_parse_from(["gwota", "info", "firmware.bin"]).unwrap();
        if let Commands::Info {
            firmware,
            json,
            sectors,
            sector_size,
        } = cli.command
        {
            assert_eq!(firmware.to_str().unwrap(), "firmware.bin");
            assert!(!json);
            assert!(!sectors);
            assert!(sector_size.is_none());
        } else {
            panic!("Expected Info command");
        }
    }

    #[test]
    fn test_cli_parse_info_with_options() {
        let cli = Cli::try_parse_from([
            "gwota",
            "info",
            "fw.bin",
            "--json",
            "--sectors",
            "--sector-size",
            "1024",
        ])
        .unwrap();
        if let Commands::Info {
            json,
            sectors,
            sector_size,
            ..
        } = cli.command
        {
            assert!(json);
            assert!(sectors);
            assert_eq!(sector_size, Some(1024));
        } else {
            panic!("Expected Info command");
        }
    }

    #[test]
    fn test_cli_parse_upload_defaults() {
        let cli = Cli::try_parse_from(["gwota", "upload", "fw.bin"]).unwrap();
        if let Commands::Upload {
            firmware,
            fail_sector,
            fail_kind,
            fail_times,
            rewind_at,
            rewind_to,
            reject_start,
            drop_start_ack,
            sector_retry_limit,
            ..
        } = cli.command
        {
            assert_eq!(firmware.to_str().unwrap(), "fw.bin");
            assert!(fail_sector.is_none());
            assert_eq!(fail_kind, FailKind::Crc);
            assert_eq!(fail_times, 1);
            assert!(rewind_at.is_none());
            assert_eq!(rewind_to, 1);
            assert!(!reject_start);
            assert!(!drop_start_ack);
            assert!(sector_retry_limit.is_none());
        } else {
            panic!("Expected Upload command");
        }
    }

    #[test]
    fn test_cli_parse_upload_with_faults() {
        let cli = Cli::try_parse_from([
            "gwota",
            "upload",
            "fw.bin",
            "--fail-sector",
            "2",
            "--fail-kind",
            "ack-crc",
            "--fail-times",
            "3",
            "--rewind-at",
            "1",
            "--rewind-to",
            "2",
            "--sector-retry-limit",
            "7",
        ])
        .unwrap();
        if let Commands::Upload {
            fail_sector,
            fail_kind,
            fail_times,
            rewind_at,
            rewind_to,
            sector_retry_limit,
            ..
        } = cli.command
        {
            assert_eq!(fail_sector, Some(2));
            assert_eq!(fail_kind, FailKind::AckCrc);
            assert_eq!(fail_times, 3);
            assert_eq!(rewind_at, Some(1));
            assert_eq!(rewind_to, 2);
            assert_eq!(sector_retry_limit, Some(7));
        } else {
            panic!("Expected Upload command");
        }
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["gwota", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "gwota",
            "-vv",
            "--quiet",
            "--config",
            "/tmp/config.toml",
            "info",
            "fw.bin",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert_eq!(cli.config_path.as_deref().unwrap().to_str(), Some("/tmp/config.toml"));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        let result = Cli::try_parse_from(["gwota"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_invalid_fail_kind() {
        let result = Cli::try_parse_from([
            "gwota",
            "upload",
            "fw.bin",
            "--fail-kind",
            "bogus",
        ]);
        assert!(result.is_err());
    }
}
