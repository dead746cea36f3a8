//! OTA upload session state machine.
//!
//! Drives a complete firmware upload over a [`Transport`]:
//!
//! ```text
//! Idle -> Starting -> Transferring -> Finishing -> Done
//!            |             |
//!            +-- Failed <--+--> Cancelled
//! ```
//!
//! `Starting` announces the image with START and waits for the command
//! ack; `Transferring` pushes each sector chunk by chunk and waits for
//! the sector ack, resending or rewinding on recoverable statuses;
//! `Finishing` emits END without waiting for an acknowledgment (the
//! device does not ack END, unlike START).
//!
//! Both ack waits poll their notification queue on a fixed interval
//! rather than blocking: the reference timings are 10 × 200 ms for
//! START and 20 × 200 ms per sector. Cancellation is cooperative and
//! observed only at sector boundaries; an in-flight chunk write is
//! never interrupted.

use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::image::sector::{self, SECTOR_SIZE, Sector};
use crate::protocol::frame::{
    CommandAck, CommandFrame, MAX_CHUNK_PAYLOAD, SectorAck, encode_chunk, status,
};
use crate::transport::{Channel, Transport};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Interval between notification queue polls.
pub const ACK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Polls while waiting for the START acknowledgment (2 s total).
pub const START_ACK_POLLS: u32 = 10;

/// Polls while waiting for a sector acknowledgment (4 s total).
pub const SECTOR_ACK_POLLS: u32 = 20;

/// Default resend ceiling per cursor position.
///
/// The original firmware tooling retried a failing sector forever;
/// this bound turns a persistently failing sector into a terminal
/// [`Error::RetryLimitExceeded`] instead.
pub const DEFAULT_SECTOR_RETRY_LIMIT: u32 = 50;

/// Tunable upload parameters, defaulting to the reference behavior.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Raw sector payload size (device geometry, 4096).
    pub sector_size: usize,
    /// Maximum chunk payload per data-channel write.
    pub chunk_payload: usize,
    /// Sleep between notification queue polls.
    pub poll_interval: Duration,
    /// Poll budget for the START acknowledgment.
    pub start_ack_polls: u32,
    /// Poll budget for each sector acknowledgment.
    pub sector_ack_polls: u32,
    /// Resends allowed per cursor position before the session fails.
    pub sector_retry_limit: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            sector_size: SECTOR_SIZE,
            chunk_payload: MAX_CHUNK_PAYLOAD,
            poll_interval: ACK_POLL_INTERVAL,
            start_ack_polls: START_ACK_POLLS,
            sector_ack_polls: SECTOR_ACK_POLLS,
            sector_retry_limit: DEFAULT_SECTOR_RETRY_LIMIT,
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No upload has run yet.
    Idle,
    /// START sent, waiting for the command acknowledgment.
    Starting,
    /// Sector transfer loop in progress.
    Transferring,
    /// All sectors acknowledged, END being issued.
    Finishing,
    /// Upload completed.
    Done,
    /// Upload aborted by the caller.
    Cancelled,
    /// Upload terminated by an error.
    Failed,
}

/// Cloneable cancellation flag for a running upload.
///
/// Cancellation is cooperative: the session checks the flag at each
/// sector boundary, so an in-flight chunk write always completes first.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Create a fresh, unset handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the upload.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Progress snapshot delivered to the caller's callback.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UploadProgress {
    /// Completed percentage, 0–100.
    pub percent: u8,
    /// Sectors acknowledged so far.
    pub sectors_sent: usize,
    /// Total sectors in this upload.
    pub total_sectors: usize,
    /// Time since the upload started.
    pub elapsed: Duration,
}

/// How an upload session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UploadOutcome {
    /// Every sector was acknowledged and END was issued.
    Completed,
    /// The caller cancelled mid-upload.
    Cancelled,
}

/// Terminal summary of an upload session.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UploadReport {
    /// How the session ended.
    pub outcome: UploadOutcome,
    /// Sectors acknowledged by the device.
    pub sectors_sent: usize,
    /// Total sectors in the image.
    pub total_sectors: usize,
    /// Raw image bytes acknowledged.
    pub bytes_sent: usize,
    /// Wall-clock duration of the session.
    pub elapsed: Duration,
}

/// OTA upload session.
///
/// Generic over the transport type `T`, which carries the two GATT
/// channel pairs. One session drives at most one upload at a time; a
/// fresh call to [`upload`](Self::upload) always begins at sector 0.
pub struct OtaSession<T: Transport> {
    transport: T,
    config: UploadConfig,
    cancel: CancelHandle,
    state: SessionState,
}

impl<T: Transport> OtaSession<T> {
    /// Create a session with the reference timing and geometry.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, UploadConfig::default())
    }

    /// Create a session with custom parameters.
    pub fn with_config(transport: T, config: UploadConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancelHandle::new(),
            state: SessionState::Idle,
        }
    }

    /// Get a cancellation handle for this session.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the session and return the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Upload a firmware image, reporting progress through `progress`.
    ///
    /// Returns the terminal report on completion or cancellation; any
    /// error is terminal for the session and a retry must call
    /// `upload` again from sector 0.
    pub fn upload<F>(&mut self, image: &FirmwareImage, mut progress: F) -> Result<UploadReport>
    where
        F: FnMut(&UploadProgress),
    {
        let started_at = Instant::now();
        self.cancel.reset();

        // Subscribe before the first command so an ack racing ahead of
        // the poll loop is absorbed by the queue instead of lost.
        let command_rx = self.transport.subscribe(Channel::Command)?;
        let data_rx = self.transport.subscribe(Channel::Data)?;

        let sectors = sector::split(image, self.config.sector_size);
        let total = sectors.len();

        self.state = SessionState::Starting;
        info!(
            "Starting upload: {} bytes in {} sectors via {}",
            image.len(),
            total,
            self.transport.name()
        );
        emit(&mut progress, 0, total, started_at);

        self.start_exchange(image, &command_rx)?;

        self.state = SessionState::Transferring;
        let mut cursor = 0usize;
        let mut bytes_sent = 0usize;
        let mut resends: u32 = 0;

        while cursor < total {
            if self.cancel.is_cancelled() {
                return Ok(self.cancel_session(&mut progress, cursor, total, started_at));
            }

            let sector = &sectors[cursor];
            self.send_sector(sector)?;

            let Some(frame) = poll_frame(&data_rx, self.config.sector_ack_polls, self.config.poll_interval)
            else {
                self.state = SessionState::Failed;
                return Err(Error::SectorAckTimeout {
                    sector: cursor,
                    attempts: self.config.sector_ack_polls,
                });
            };

            // A notification that fails validation is handled as the
            // CRC-error sentinel, never interpreted field by field.
            let ack = match SectorAck::decode(&frame) {
                Ok(ack) => ack,
                Err(e) => {
                    debug!("Sector ack failed validation: {e}");
                    SectorAck {
                        sector_sent: sector.wire_index(),
                        status: status::NOTIFY_CRC_ERROR,
                        cur_sector: 0,
                    }
                },
            };

            match ack.status {
                status::SUCCESS => {
                    bytes_sent += sector.raw_len();
                    cursor += 1;
                    resends = 0;
                    debug!("Sector {cursor}/{total} acknowledged");
                    emit(&mut progress, cursor, total, started_at);
                },
                status::CRC_ERROR | status::LENGTH_ERROR | status::NOTIFY_CRC_ERROR => {
                    resends += 1;
                    if resends > self.config.sector_retry_limit {
                        self.state = SessionState::Failed;
                        return Err(Error::RetryLimitExceeded {
                            sector: cursor,
                            attempts: resends - 1,
                        });
                    }
                    warn!(
                        "Sector {} reported status {:#06x}, resending ({}/{})",
                        cursor, ack.status, resends, self.config.sector_retry_limit
                    );
                },
                status::SECTOR_ERROR => {
                    // The device names the sector it expects, 1-based.
                    // The jump only ever rewinds.
                    let target = usize::from(ack.cur_sector.saturating_sub(1)).min(cursor);
                    warn!(
                        "Device expects sector {} (1-based), rewinding cursor {} -> {}",
                        ack.cur_sector, cursor, target
                    );
                    cursor = target;
                    resends = 0;
                },
                other => {
                    self.state = SessionState::Failed;
                    return Err(Error::UnknownStatus(other));
                },
            }
        }

        self.state = SessionState::Finishing;
        debug!("All sectors acknowledged, sending END");
        // Fire-and-forget: END has no acknowledgment to wait for.
        self.send_command(&CommandFrame::end())?;

        self.state = SessionState::Done;
        emit(&mut progress, total, total, started_at);
        let elapsed = started_at.elapsed();
        info!("Upload complete: {bytes_sent} bytes in {elapsed:?}");

        Ok(UploadReport {
            outcome: UploadOutcome::Completed,
            sectors_sent: total,
            total_sectors: total,
            bytes_sent,
            elapsed,
        })
    }

    /// Send START and wait for the device to accept it.
    fn start_exchange(&mut self, image: &FirmwareImage, command_rx: &Receiver<Vec<u8>>) -> Result<()> {
        self.send_command(&CommandFrame::start(image.wire_len()))?;

        let Some(frame) = poll_frame(command_rx, self.config.start_ack_polls, self.config.poll_interval)
        else {
            self.state = SessionState::Failed;
            return Err(Error::AckTimeout {
                attempts: self.config.start_ack_polls,
            });
        };

        let rsp = match CommandAck::decode(&frame) {
            Ok(ack) => ack.rsp,
            Err(e) => {
                debug!("Command ack failed validation: {e}");
                status::NOTIFY_CRC_ERROR
            },
        };
        if rsp != status::SUCCESS {
            self.state = SessionState::Failed;
            return Err(Error::StartRejected(rsp));
        }
        debug!("START acknowledged");
        Ok(())
    }

    /// Transmit one sector's chunks in ascending sequence order.
    fn send_sector(&mut self, sector: &Sector) -> Result<()> {
        trace!(
            "Sending sector {} ({} bytes, wire index {:#06x})",
            sector.index(),
            sector.wire_bytes().len(),
            sector.wire_index()
        );
        for chunk in sector.chunks(self.config.chunk_payload) {
            let frame = encode_chunk(sector.wire_index(), chunk.seq, chunk.payload);
            self.transport.write_frame(Channel::Data, &frame)?;
        }
        Ok(())
    }

    /// Send a command frame over the command channel.
    fn send_command(&mut self, frame: &CommandFrame) -> Result<()> {
        trace!("Sending command {:?}", frame.command());
        self.transport.write_frame(Channel::Command, &frame.build())
    }

    /// Wind the session down after an observed cancellation request.
    fn cancel_session<F>(
        &mut self,
        progress: &mut F,
        cursor: usize,
        total: usize,
        started_at: Instant,
    ) -> UploadReport
    where
        F: FnMut(&UploadProgress),
    {
        self.state = SessionState::Cancelled;
        info!("Upload cancelled by caller");

        // Both notifications are best-effort; a dead link must not
        // turn cancellation into a failure.
        if let Err(e) = self.send_command(&CommandFrame::cancel()) {
            warn!("CANCEL command not delivered: {e}");
        }
        if let Err(e) = self.transport.request_restart() {
            warn!("Restart request not delivered: {e}");
        }

        // The UI contract resets the bar to zero on cancellation.
        emit(progress, 0, total, started_at);

        UploadReport {
            outcome: UploadOutcome::Cancelled,
            sectors_sent: cursor,
            total_sectors: total,
            bytes_sent: 0,
            elapsed: started_at.elapsed(),
        }
    }
}

/// Invoke the progress callback with a fresh snapshot.
#[allow(clippy::cast_possible_truncation)] // percent is bounded by 100
fn emit<F>(progress: &mut F, sectors_sent: usize, total_sectors: usize, started_at: Instant)
where
    F: FnMut(&UploadProgress),
{
    let percent = if total_sectors == 0 {
        100
    } else {
        (sectors_sent * 100 / total_sectors) as u8
    };
    progress(&UploadProgress {
        percent,
        sectors_sent,
        total_sectors,
        elapsed: started_at.elapsed(),
    });
}

/// Poll a notification queue with a bounded attempt budget.
///
/// One generic wait shared by the START and per-sector paths: check
/// the queue, sleep `interval`, repeat up to `polls` times. Returns
/// the first frame seen, or `None` when the budget is spent or the
/// queue's producer is gone.
fn poll_frame(rx: &Receiver<Vec<u8>>, polls: u32, interval: Duration) -> Option<Vec<u8>> {
    for attempt in 0..polls {
        match rx.try_recv() {
            Ok(frame) => {
                trace!("Notification after {attempt} polls ({} bytes)", frame.len());
                return Some(frame);
            },
            Err(TryRecvError::Empty) => {},
            Err(TryRecvError::Disconnected) => {
                warn!("Notification queue closed while polling");
                return None;
            },
        }
        thread::sleep(interval);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FaultPlan, GatewayEmulator};
    use std::sync::mpsc::{self, Sender};

    /// Scripted transport with pre-loaded notification queues.
    ///
    /// Unlike the emulator it never reacts to writes; tests enqueue
    /// whatever the "device" should have said ahead of time.
    struct MockTransport {
        command_tx: Sender<Vec<u8>>,
        command_rx: Option<Receiver<Vec<u8>>>,
        data_tx: Sender<Vec<u8>>,
        data_rx: Option<Receiver<Vec<u8>>>,
        written: Vec<(Channel, Vec<u8>)>,
        restarts: u32,
    }

    impl MockTransport {
        fn new() -> Self {
            let (command_tx, command_rx) = mpsc::channel();
            let (data_tx, data_rx) = mpsc::channel();
            Self {
                command_tx,
                command_rx: Some(command_rx),
                data_tx,
                data_rx: Some(data_rx),
                written: Vec::new(),
                restarts: 0,
            }
        }

        fn queue_command(&self, frame: Vec<u8>) {
            self.command_tx.send(frame).unwrap();
        }

        fn queue_data(&self, frame: Vec<u8>) {
            self.data_tx.send(frame).unwrap();
        }

        fn data_writes(&self) -> usize {
            self.written.iter().filter(|(c, _)| *c == Channel::Data).count()
        }

        fn command_frames(&self) -> Vec<&[u8]> {
            self.written
                .iter()
                .filter(|(c, _)| *c == Channel::Command)
                .map(|(_, f)| f.as_slice())
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn write_frame(&mut self, channel: Channel, frame: &[u8]) -> Result<()> {
            self.written.push((channel, frame.to_vec()));
            Ok(())
        }

        fn subscribe(&mut self, channel: Channel) -> Result<Receiver<Vec<u8>>> {
            let slot = match channel {
                Channel::Command => &mut self.command_rx,
                Channel::Data => &mut self.data_rx,
            };
            slot.take()
                .ok_or_else(|| Error::Transport("already subscribed".into()))
        }

        fn request_restart(&mut self) -> Result<()> {
            self.restarts += 1;
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn fast_config() -> UploadConfig {
        UploadConfig {
            poll_interval: Duration::from_millis(1),
            ..UploadConfig::default()
        }
    }

    fn image(len: usize) -> FirmwareImage {
        let data: Vec<u8> = (0..len).map(|i| (i % 247) as u8).collect();
        FirmwareImage::from_bytes(data).unwrap()
    }

    fn start_ack_ok() -> Vec<u8> {
        CommandAck {
            ack: 0x0001,
            cmd: 0x0001,
            rsp: status::SUCCESS,
        }
        .encode()
        .to_vec()
    }

    #[test]
    fn test_start_ack_timeout_never_transfers() {
        let mut session = OtaSession::with_config(MockTransport::new(), fast_config());
        let result = session.upload(&image(100), |_| {});

        assert!(matches!(result, Err(Error::AckTimeout { attempts: 10 })));
        assert_eq!(session.state(), SessionState::Failed);
        // No chunk may be written before START is acknowledged.
        assert_eq!(session.transport().data_writes(), 0);
    }

    #[test]
    fn test_start_rejected() {
        let transport = MockTransport::new();
        transport.queue_command(
            CommandAck {
                ack: 0x0001,
                cmd: 0x0001,
                rsp: 0x0001,
            }
            .encode()
            .to_vec(),
        );
        let mut session = OtaSession::with_config(transport, fast_config());
        let result = session.upload(&image(100), |_| {});

        assert!(matches!(result, Err(Error::StartRejected(0x0001))));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_malformed_start_ack_maps_to_sentinel() {
        let transport = MockTransport::new();
        let mut bad = start_ack_ok();
        bad[3] ^= 0xFF; // break the CRC
        transport.queue_command(bad);
        let mut session = OtaSession::with_config(transport, fast_config());
        let result = session.upload(&image(100), |_| {});

        assert!(matches!(
            result,
            Err(Error::StartRejected(status::NOTIFY_CRC_ERROR))
        ));
    }

    #[test]
    fn test_short_start_ack_maps_to_sentinel() {
        let transport = MockTransport::new();
        transport.queue_command(vec![0u8; 19]);
        let mut session = OtaSession::with_config(transport, fast_config());
        let result = session.upload(&image(100), |_| {});

        assert!(matches!(
            result,
            Err(Error::StartRejected(status::NOTIFY_CRC_ERROR))
        ));
    }

    #[test]
    fn test_sector_ack_timeout() {
        let transport = MockTransport::new();
        transport.queue_command(start_ack_ok());
        let mut session = OtaSession::with_config(transport, fast_config());
        let result = session.upload(&image(100), |_| {});

        assert!(matches!(
            result,
            Err(Error::SectorAckTimeout {
                sector: 0,
                attempts: 20
            })
        ));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_unknown_status_is_terminal() {
        let transport = MockTransport::new();
        transport.queue_command(start_ack_ok());
        transport.queue_data(
            SectorAck {
                sector_sent: 0xFFFF,
                status: 0x0009,
                cur_sector: 0,
            }
            .encode()
            .to_vec(),
        );
        let mut session = OtaSession::with_config(transport, fast_config());
        let result = session.upload(&image(100), |_| {});

        assert!(matches!(result, Err(Error::UnknownStatus(0x0009))));
    }

    #[test]
    fn test_cancel_before_first_sector() {
        let transport = MockTransport::new();
        transport.queue_command(start_ack_ok());
        let mut session = OtaSession::with_config(transport, fast_config());
        let handle = session.cancel_handle();

        let mut last_percent = None;
        let report = session
            .upload(&image(100), |p| {
                last_percent = Some(p.percent);
                handle.cancel();
            })
            .unwrap();

        assert_eq!(report.outcome, UploadOutcome::Cancelled);
        assert_eq!(session.state(), SessionState::Cancelled);
        // Progress resets to zero on cancellation.
        assert_eq!(last_percent, Some(0));

        let transport = session.into_transport();
        // No chunks went out, a CANCEL frame did, restart was asked.
        assert_eq!(transport.data_writes(), 0);
        let commands = transport.command_frames();
        assert_eq!(commands.len(), 2); // START, then CANCEL
        assert_eq!(&commands[1][0..2], &[0x03, 0x00]);
        assert_eq!(transport.restarts, 1);
    }

    // ---- end-to-end runs against the emulator ----

    fn emulator_session(
        emulator: GatewayEmulator,
        sector_size: usize,
    ) -> OtaSession<GatewayEmulator> {
        let config = UploadConfig {
            sector_size,
            poll_interval: Duration::from_millis(1),
            ..UploadConfig::default()
        };
        OtaSession::with_config(emulator.with_sector_size(sector_size), config)
    }

    #[test]
    fn test_round_trip_against_emulator() {
        let img = image(10000);
        let mut session = emulator_session(GatewayEmulator::new(), SECTOR_SIZE);

        let mut percents = Vec::new();
        let report = session.upload(&img, |p| percents.push(p.percent)).unwrap();

        assert_eq!(report.outcome, UploadOutcome::Completed);
        assert_eq!(report.sectors_sent, 3);
        assert_eq!(report.bytes_sent, 10000);
        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(percents.first(), Some(&0));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));

        let emulator = session.into_transport();
        assert!(emulator.is_ended());
        assert_eq!(emulator.flash(), img.as_bytes());
    }

    #[test]
    fn test_crc_failure_resends_and_completes() {
        let faults = FaultPlan {
            sector_crc_failures: Some((1, 1)),
            ..FaultPlan::default()
        };
        let img = image(1000);
        let mut session = emulator_session(GatewayEmulator::with_faults(faults), 256);
        let report = session.upload(&img, |_| {}).unwrap();

        assert_eq!(report.outcome, UploadOutcome::Completed);
        assert_eq!(session.into_transport().flash(), img.as_bytes());
    }

    #[test]
    fn test_corrupted_ack_triggers_sentinel_resend() {
        let faults = FaultPlan {
            corrupt_ack_for_sector: Some(0),
            ..FaultPlan::default()
        };
        let img = image(600);
        let mut session = emulator_session(GatewayEmulator::with_faults(faults), 256);
        let report = session.upload(&img, |_| {}).unwrap();

        assert_eq!(report.outcome, UploadOutcome::Completed);
        assert_eq!(session.into_transport().flash(), img.as_bytes());
    }

    #[test]
    fn test_rewind_recovery() {
        // Device demands a rewind to 1-based sector 3 after sector 3
        // (0-based 2) was stored: cursor moves back to 0-based 2.
        let faults = FaultPlan {
            rewind: Some((2, 3)),
            ..FaultPlan::default()
        };
        let img = image(1200);
        let mut session = emulator_session(GatewayEmulator::with_faults(faults), 256);
        let report = session.upload(&img, |_| {}).unwrap();

        assert_eq!(report.outcome, UploadOutcome::Completed);
        assert_eq!(session.into_transport().flash(), img.as_bytes());
    }

    #[test]
    fn test_retry_limit_exceeded() {
        let faults = FaultPlan {
            sector_crc_failures: Some((0, u32::MAX)),
            ..FaultPlan::default()
        };
        let config = UploadConfig {
            sector_size: 256,
            poll_interval: Duration::from_millis(1),
            sector_retry_limit: 3,
            ..UploadConfig::default()
        };
        let mut session = OtaSession::with_config(
            GatewayEmulator::with_faults(faults).with_sector_size(256),
            config,
        );
        let result = session.upload(&image(100), |_| {});

        assert!(matches!(
            result,
            Err(Error::RetryLimitExceeded {
                sector: 0,
                attempts: 3
            })
        ));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_cancel_mid_transfer_stops_chunks() {
        let img = image(1200);
        let mut session = emulator_session(GatewayEmulator::new(), 256);
        let handle = session.cancel_handle();

        // Cancel once the first sector is acknowledged.
        let report = session
            .upload(&img, |p| {
                if p.sectors_sent == 1 {
                    handle.cancel();
                }
            })
            .unwrap();

        assert_eq!(report.outcome, UploadOutcome::Cancelled);
        assert_eq!(report.sectors_sent, 1);

        let emulator = session.into_transport();
        assert!(emulator.is_cancelled());
        assert_eq!(emulator.restart_requests(), 1);
        assert!(!emulator.is_ended());
    }

    #[test]
    fn test_drop_start_ack_times_out() {
        let faults = FaultPlan {
            drop_start_ack: true,
            ..FaultPlan::default()
        };
        let config = UploadConfig {
            poll_interval: Duration::from_millis(1),
            ..UploadConfig::default()
        };
        let mut session =
            OtaSession::with_config(GatewayEmulator::with_faults(faults), config);
        let result = session.upload(&image(100), |_| {});

        assert!(matches!(result, Err(Error::AckTimeout { .. })));
    }
}
