//! Emulator-backed upload command.
//!
//! Runs the real OTA session against the in-process gateway emulator,
//! optionally injecting device-side faults to demonstrate the retry,
//! rewind, and cancellation paths.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use console::style;
use gwota::device::{FaultPlan, GatewayEmulator};
use gwota::{FirmwareImage, OtaSession, SECTOR_SIZE, Transport, UploadConfig, UploadOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output};

/// Device-side failure to inject for a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum FailKind {
    /// Report a sector CRC failure.
    Crc,
    /// Report a sector length failure.
    Length,
    /// Corrupt the acknowledgment's own CRC trailer.
    AckCrc,
}

/// Options collected from the `upload` subcommand flags.
#[derive(Debug, Clone)]
pub(crate) struct UploadOptions {
    pub fail_sector: Option<usize>,
    pub fail_kind: FailKind,
    pub fail_times: u32,
    pub rewind_at: Option<usize>,
    pub rewind_to: u16,
    pub reject_start: bool,
    pub drop_start_ack: bool,
    pub sector_size: Option<usize>,
    pub sector_retry_limit: Option<u32>,
}

impl UploadOptions {
    fn fault_plan(&self) -> FaultPlan {
        let mut plan = FaultPlan {
            reject_start: self.reject_start,
            drop_start_ack: self.drop_start_ack,
            ..FaultPlan::default()
        };
        if let Some(sector) = self.fail_sector {
            match self.fail_kind {
                FailKind::Crc => plan.sector_crc_failures = Some((sector, self.fail_times)),
                FailKind::Length => plan.sector_length_failures = Some((sector, self.fail_times)),
                FailKind::AckCrc => plan.corrupt_ack_for_sector = Some(sector),
            }
        }
        if let Some(sector) = self.rewind_at {
            plan.rewind = Some((sector, self.rewind_to));
        }
        plan
    }
}

/// Upload command implementation.
pub(crate) fn cmd_upload(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    options: &UploadOptions,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware image {}",
            style("📦").cyan(),
            style(firmware.display()).bold()
        );
    }

    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware image {}", firmware.display()))?;

    let sector_size = options
        .sector_size
        .or(config.upload.sector_size)
        .unwrap_or(SECTOR_SIZE);

    let mut upload_config = UploadConfig {
        sector_size,
        ..UploadConfig::default()
    };
    if let Some(limit) = options.sector_retry_limit.or(config.upload.sector_retry_limit) {
        upload_config.sector_retry_limit = limit;
    }
    if let Some(ms) = config.upload.poll_interval_ms {
        upload_config.poll_interval = Duration::from_millis(ms);
    }

    let plan = options.fault_plan();
    debug!("Fault plan: {plan:?}");
    let emulator = GatewayEmulator::with_faults(plan).with_sector_size(sector_size);

    let mut session = OtaSession::with_config(emulator, upload_config);
    let cancel = session.cancel_handle();
    ctrlc::set_handler(move || cancel.cancel())
        .context("Failed to install Ctrl-C handler")?;

    if !cli.quiet {
        eprintln!(
            "{} Uploading {} bytes to {}",
            style("⏳").yellow(),
            image.len(),
            session.transport().name()
        );
    }

    // Create progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let report = session.upload(&image, |p| {
        pb.set_position(u64::from(p.percent));
        pb.set_message(format!("sector {}/{}", p.sectors_sent, p.total_sectors));
    });

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            return Err(e.into());
        },
    };

    match report.outcome {
        UploadOutcome::Completed => {
            pb.finish_with_message("complete".to_string());

            // The emulator recorded what "flash" received; a mismatch
            // here means the engine corrupted the stream.
            let emulator = session.into_transport();
            if emulator.flash() != image.as_bytes() {
                bail!("Emulator flash contents differ from the source image");
            }

            if !cli.quiet {
                eprintln!(
                    "{} Flash contents verified against the source image",
                    style("✓").green()
                );
                eprintln!(
                    "\n{} Uploaded {} bytes in {} sectors ({:.1?})",
                    style("🎉").green().bold(),
                    report.bytes_sent,
                    report.sectors_sent,
                    report.elapsed
                );
            }
            Ok(())
        },
        UploadOutcome::Cancelled => {
            pb.abandon_with_message("cancelled".to_string());
            let emulator = session.into_transport();
            debug!(
                "Cancelled after {} of {} sectors (restart requests: {})",
                report.sectors_sent,
                report.total_sectors,
                emulator.restart_requests()
            );
            Err(CliError::Cancelled(format!(
                "Upload cancelled after {} of {} sectors",
                report.sectors_sent, report.total_sectors
            ))
            .into())
        },
    }
}
