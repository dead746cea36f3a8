//! # gwota
//!
//! A library implementing the BLE OTA firmware update protocol for the
//! LoRaWAN/Modbus sensor gateway family.
//!
//! This crate provides the host side of the gateway's over-the-air
//! update service:
//!
//! - CRC-16/CCITT frame checksums
//! - Command/ack/chunk wire framing
//! - Sector splitting and chunking of firmware images
//! - The upload session state machine (retry, rewind, cancel)
//! - A transport abstraction over the two GATT channel pairs
//!
//! ## Supported transports
//!
//! - **Gateway emulator** (built in): an in-process device model for
//!   tests and development tooling
//! - **Web Bluetooth** (experimental, `wasm` feature): the browser
//!   frontend's transport, pending web-sys API stabilization
//!
//! Production embedders implement [`Transport`] over their own BLE
//! stack; the session never touches connection management.
//!
//! ## Features
//!
//! - `serde`: serialization support for data types
//! - `wasm`: WASM/Web Bluetooth support (experimental)
//!
//! ## Example
//!
//! ```rust,no_run
//! use gwota::device::GatewayEmulator;
//! use gwota::{FirmwareImage, OtaSession};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load the firmware image selected for upload
//!     let image = FirmwareImage::from_file("firmware.bin")?;
//!
//!     // Drive the session over any Transport implementation
//!     let mut session = OtaSession::new(GatewayEmulator::new());
//!     let cancel = session.cancel_handle();
//!
//!     let report = session.upload(&image, |p| {
//!         println!("{}% ({}/{} sectors)", p.percent, p.sectors_sent, p.total_sectors);
//!     })?;
//!     println!("{:?} after {:?}", report.outcome, report.elapsed);
//!
//!     // Elsewhere: cancel.cancel() stops the upload at the next
//!     // sector boundary.
//!     drop(cancel);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod image;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
// WASM-specific re-exports
#[cfg(feature = "wasm")]
pub use transport::web::WebBluetoothTransport;
pub use {
    device::{FaultPlan, GatewayEmulator},
    error::{Error, Result},
    image::{FirmwareImage, SECTOR_SIZE, Sector, split, split_default},
    protocol::frame::{
        Command, CommandAck, CommandFrame, FrameError, LAST_CHUNK_SEQ, LAST_SECTOR_INDEX,
        MAX_CHUNK_PAYLOAD, SectorAck, status,
    },
    session::{
        CancelHandle, OtaSession, SessionState, UploadConfig, UploadOutcome, UploadProgress,
        UploadReport,
    },
    transport::{Channel, Transport},
};
