//! In-process gateway emulator.
//!
//! Implements the device side of the OTA protocol behind the
//! [`Transport`] trait: command handling, chunk reassembly, sector CRC
//! verification, and acknowledgments on the proper channels. The CLI's
//! `upload` command and the end-to-end tests run the real session
//! against it instead of hardware.
//!
//! The emulator answers synchronously from inside `write_frame`, which
//! also exercises the session's queue-absorption guarantee: every ack
//! is enqueued before the session begins polling for it.

use crate::error::{Error, Result};
use crate::image::sector::SECTOR_SIZE;
use crate::protocol::crc::crc16;
use crate::protocol::frame::{
    ChunkHeader, Command, CommandAck, CommandRequest, LAST_SECTOR_INDEX, SectorAck, status,
};
use crate::transport::{Channel, Transport};
use log::{debug, trace, warn};
use std::sync::mpsc::{self, Receiver, Sender};

/// Fault injection plan for exercising the session's recovery paths.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Answer START with a non-zero response code.
    pub reject_start: bool,
    /// Swallow the START acknowledgment entirely.
    pub drop_start_ack: bool,
    /// Report a sector CRC failure for `(sector, times)` before
    /// accepting it.
    pub sector_crc_failures: Option<(usize, u32)>,
    /// Report a sector length failure for `(sector, times)` before
    /// accepting it.
    pub sector_length_failures: Option<(usize, u32)>,
    /// Corrupt the CRC trailer of the ack for this sector, once.
    pub corrupt_ack_for_sector: Option<usize>,
    /// After storing `(sector, target)`, demand a rewind to the
    /// 1-based sector `target`, once.
    pub rewind: Option<(usize, u16)>,
}

/// One side of a notification channel pair.
struct NotifyQueue {
    tx: Sender<Vec<u8>>,
    rx: Option<Receiver<Vec<u8>>>,
}

impl NotifyQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx: Some(rx) }
    }
}

/// Device-side emulator of the gateway's OTA service.
pub struct GatewayEmulator {
    command: NotifyQueue,
    data: NotifyQueue,
    faults: FaultPlan,
    sector_size: usize,

    image_size: usize,
    sector_count: usize,
    flash: Vec<u8>,
    started: bool,
    ended: bool,
    cancelled: bool,
    restart_requests: u32,

    // Current reassembly state.
    assembling: Vec<u8>,
    assembling_sector: Option<u16>,
    next_chunk_seq: u8,
    out_of_order: bool,

    // Remaining fault budget.
    crc_failures_left: u32,
    length_failures_left: u32,
    ack_corruption_armed: bool,
    rewind_armed: bool,
}

impl Default for GatewayEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayEmulator {
    /// Create an emulator with clean behavior.
    pub fn new() -> Self {
        Self::with_faults(FaultPlan::default())
    }

    /// Create an emulator that misbehaves according to `faults`.
    pub fn with_faults(faults: FaultPlan) -> Self {
        let crc_failures_left = faults.sector_crc_failures.map_or(0, |(_, n)| n);
        let length_failures_left = faults.sector_length_failures.map_or(0, |(_, n)| n);
        let ack_corruption_armed = faults.corrupt_ack_for_sector.is_some();
        let rewind_armed = faults.rewind.is_some();

        Self {
            command: NotifyQueue::new(),
            data: NotifyQueue::new(),
            faults,
            sector_size: SECTOR_SIZE,
            image_size: 0,
            sector_count: 0,
            flash: Vec::new(),
            started: false,
            ended: false,
            cancelled: false,
            restart_requests: 0,
            assembling: Vec::new(),
            assembling_sector: None,
            next_chunk_seq: 0,
            out_of_order: false,
            crc_failures_left,
            length_failures_left,
            ack_corruption_armed,
            rewind_armed,
        }
    }

    /// Override the device's sector geometry (default 4096 bytes).
    #[must_use]
    pub fn with_sector_size(mut self, sector_size: usize) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Flash contents written so far, sized to the announced image.
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Whether the host completed the upload with END.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Whether the host aborted the upload with CANCEL.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Number of commit/restart requests received.
    pub fn restart_requests(&self) -> u32 {
        self.restart_requests
    }

    fn push(&self, channel: Channel, frame: Vec<u8>) {
        let tx = match channel {
            Channel::Command => &self.command.tx,
            Channel::Data => &self.data.tx,
        };
        if tx.send(frame).is_err() {
            warn!("emulator: {channel} notification dropped, host receiver gone");
        }
    }

    fn handle_command(&mut self, frame: &[u8]) {
        let request = match CommandRequest::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                warn!("emulator: malformed command frame: {e}");
                self.push(
                    Channel::Command,
                    CommandAck {
                        ack: 0x0001,
                        cmd: 0,
                        rsp: status::CRC_ERROR,
                    }
                    .encode()
                    .to_vec(),
                );
                return;
            },
        };

        match request.command() {
            Some(Command::Start) => {
                self.image_size = request.arg as usize;
                self.sector_count = self.image_size.div_ceil(self.sector_size);
                // Erased-flash fill; sectors overwrite their slots.
                self.flash = vec![0xFF; self.image_size];
                self.started = true;
                self.ended = false;
                self.cancelled = false;
                self.assembling.clear();
                self.assembling_sector = None;

                debug!(
                    "emulator: START for {} bytes ({} sectors)",
                    self.image_size, self.sector_count
                );

                if self.faults.drop_start_ack {
                    debug!("emulator: dropping START ack (fault injection)");
                    return;
                }
                let rsp = if self.faults.reject_start {
                    status::CRC_ERROR
                } else {
                    status::SUCCESS
                };
                self.push(
                    Channel::Command,
                    CommandAck {
                        ack: 0x0001,
                        cmd: Command::Start as u16,
                        rsp,
                    }
                    .encode()
                    .to_vec(),
                );
            },
            Some(Command::End) => {
                debug!("emulator: END received");
                self.ended = true;
                // END is fire-and-forget on the host side; no ack.
            },
            Some(Command::Cancel) => {
                debug!("emulator: CANCEL received");
                self.cancelled = true;
                self.started = false;
                self.push(
                    Channel::Command,
                    CommandAck {
                        ack: 0x0001,
                        cmd: Command::Cancel as u16,
                        rsp: status::SUCCESS,
                    }
                    .encode()
                    .to_vec(),
                );
            },
            None => {
                warn!("emulator: unknown command {:#06x}", request.cmd);
                self.push(
                    Channel::Command,
                    CommandAck {
                        ack: 0x0001,
                        cmd: request.cmd,
                        rsp: status::CRC_ERROR,
                    }
                    .encode()
                    .to_vec(),
                );
            },
        }
    }

    fn handle_chunk(&mut self, frame: &[u8]) {
        if !self.started {
            warn!("emulator: data chunk before START, dropping");
            return;
        }
        let Some((header, payload)) = ChunkHeader::split(frame) else {
            warn!("emulator: short data frame ({} bytes), dropping", frame.len());
            return;
        };

        // A new sector index restarts reassembly.
        if self.assembling_sector != Some(header.sector_index) {
            self.assembling.clear();
            self.assembling_sector = Some(header.sector_index);
            self.next_chunk_seq = 0;
            self.out_of_order = false;
        }

        if !header.is_last() {
            if header.chunk_seq != self.next_chunk_seq {
                warn!(
                    "emulator: chunk {} arrived, expected {}",
                    header.chunk_seq, self.next_chunk_seq
                );
                self.out_of_order = true;
            }
            self.next_chunk_seq = self.next_chunk_seq.wrapping_add(1);
            self.assembling.extend_from_slice(payload);
            return;
        }

        self.assembling.extend_from_slice(payload);
        trace!(
            "emulator: sector {:#06x} complete, {} bytes",
            header.sector_index,
            self.assembling.len()
        );
        self.finish_sector(header.sector_index);
    }

    /// Resolve the on-wire sector index to the true zero-based index.
    fn true_index(&self, wire_index: u16) -> usize {
        if wire_index == LAST_SECTOR_INDEX {
            self.sector_count.saturating_sub(1)
        } else {
            wire_index as usize
        }
    }

    fn finish_sector(&mut self, wire_index: u16) {
        let index = self.true_index(wire_index);
        let bytes = std::mem::take(&mut self.assembling);
        self.assembling_sector = None;

        let next_expected = (index + 1).min(self.sector_count);
        #[allow(clippy::cast_possible_truncation)] // sector counts fit u16 addressing
        let cur_sector = next_expected as u16 + 1; // 1-based

        let mut ack = SectorAck {
            sector_sent: wire_index,
            status: status::SUCCESS,
            cur_sector,
        };

        // Injected failures come before real verification so the host
        // retries a sector the emulator would otherwise accept.
        if self.faults.sector_length_failures.map(|(s, _)| s) == Some(index)
            && self.length_failures_left > 0
        {
            self.length_failures_left -= 1;
            ack.status = status::LENGTH_ERROR;
            self.push(Channel::Data, ack.encode().to_vec());
            return;
        }
        if self.faults.sector_crc_failures.map(|(s, _)| s) == Some(index)
            && self.crc_failures_left > 0
        {
            self.crc_failures_left -= 1;
            ack.status = status::CRC_ERROR;
            self.push(Channel::Data, ack.encode().to_vec());
            return;
        }

        // Genuine verification: sequencing, length, trailing CRC.
        if self.out_of_order || bytes.len() < 3 {
            ack.status = status::LENGTH_ERROR;
            self.push(Channel::Data, ack.encode().to_vec());
            return;
        }
        let (payload, trailer) = bytes.split_at(bytes.len() - 2);
        let stored = u16::from_le_bytes([trailer[0], trailer[1]]);
        if crc16(payload) != stored {
            debug!("emulator: sector {index} failed CRC check");
            ack.status = status::CRC_ERROR;
            self.push(Channel::Data, ack.encode().to_vec());
            return;
        }

        let start = index * self.sector_size;
        let end = start + payload.len();
        if end > self.flash.len() {
            warn!("emulator: sector {index} overruns flash ({end} > {})", self.flash.len());
            ack.status = status::LENGTH_ERROR;
            self.push(Channel::Data, ack.encode().to_vec());
            return;
        }
        self.flash[start..end].copy_from_slice(payload);
        debug!("emulator: stored sector {index} ({} bytes)", payload.len());

        // Rewind demand fires once, after the sector was stored.
        if self.rewind_armed && self.faults.rewind.map(|(s, _)| s) == Some(index) {
            self.rewind_armed = false;
            let (_, target) = self.faults.rewind.unwrap_or((0, 1));
            ack.status = status::SECTOR_ERROR;
            ack.cur_sector = target;
            self.push(Channel::Data, ack.encode().to_vec());
            return;
        }

        let mut encoded = ack.encode();
        if self.ack_corruption_armed && self.faults.corrupt_ack_for_sector == Some(index) {
            self.ack_corruption_armed = false;
            debug!("emulator: corrupting ack for sector {index} (fault injection)");
            encoded[0] ^= 0xA5;
        }
        self.push(Channel::Data, encoded.to_vec());
    }
}

impl Transport for GatewayEmulator {
    fn write_frame(&mut self, channel: Channel, frame: &[u8]) -> Result<()> {
        match channel {
            Channel::Command => self.handle_command(frame),
            Channel::Data => self.handle_chunk(frame),
        }
        Ok(())
    }

    fn subscribe(&mut self, channel: Channel) -> Result<Receiver<Vec<u8>>> {
        let slot = match channel {
            Channel::Command => &mut self.command.rx,
            Channel::Data => &mut self.data.rx,
        };
        slot.take()
            .ok_or_else(|| Error::Transport(format!("{channel} channel already subscribed")))
    }

    fn request_restart(&mut self) -> Result<()> {
        debug!("emulator: restart requested");
        self.restart_requests += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "gateway-emulator"
    }
}
