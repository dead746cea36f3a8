//! Firmware image inspection command.

use anyhow::{Context, Result};
use console::style;
use gwota::{FirmwareImage, MAX_CHUNK_PAYLOAD, split};
use std::path::Path;

/// Info command implementation.
pub(crate) fn cmd_info(firmware: &Path, sector_size: usize, json: bool, sectors: bool) -> Result<()> {
    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware image {}", firmware.display()))?;
    let plan = split(&image, sector_size);

    if json {
        return cmd_info_json(firmware, &image, sector_size, &plan);
    }

    eprintln!(
        "{} {}",
        style("📦").cyan(),
        style(firmware.display()).bold()
    );

    eprintln!("\n{}", style("Upload plan").bold().underlined());
    eprintln!("  Image size:   {} bytes", image.len());
    eprintln!("  Sector size:  {sector_size} bytes (+2 CRC)");
    eprintln!("  Sectors:      {}", plan.len());
    let chunk_total: usize = plan.iter().map(|s| s.chunks(MAX_CHUNK_PAYLOAD).len()).sum();
    eprintln!("  Chunks:       {chunk_total} (≤{MAX_CHUNK_PAYLOAD} bytes payload)");
    if let Some(last) = plan.last() {
        eprintln!("  Last sector:  {} bytes, wire index 0xFFFF", last.raw_len());
    }

    if sectors {
        eprintln!("\n{}", style("Sectors").bold().underlined());
        for sector in &plan {
            eprintln!(
                "  [{:3}] wire {:#06x}  {:4} bytes  crc {:04X}  {} chunks",
                sector.index(),
                sector.wire_index(),
                sector.raw_len(),
                sector.crc(),
                sector.chunks(MAX_CHUNK_PAYLOAD).len()
            );
        }
    }

    Ok(())
}

/// Info command `--json` output: structured JSON to stdout.
fn cmd_info_json(
    firmware: &Path,
    image: &FirmwareImage,
    sector_size: usize,
    plan: &[gwota::Sector],
) -> Result<()> {
    let sectors: Vec<serde_json::Value> = plan
        .iter()
        .map(|sector| {
            serde_json::json!({
                "index": sector.index(),
                "wire_index": format!("0x{:04X}", sector.wire_index()),
                "length": sector.raw_len(),
                "crc": format!("0x{:04X}", sector.crc()),
                "chunks": sector.chunks(MAX_CHUNK_PAYLOAD).len(),
            })
        })
        .collect();

    let info = serde_json::json!({
        "ok": true,
        "data": {
            "file": firmware.display().to_string(),
            "image_size": image.len(),
            "sector_size": sector_size,
            "sector_count": plan.len(),
            "chunk_payload": MAX_CHUNK_PAYLOAD,
            "sectors": sectors,
        }
    });

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
