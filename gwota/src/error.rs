//! Error types for gwota.

use std::io;
use thiserror::Error;

/// Result type for gwota operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gwota operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport failure (frame write, subscription, restart request).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Firmware image rejected before upload.
    #[error("Invalid firmware image: {0}")]
    InvalidImage(String),

    /// No START acknowledgment arrived within the polling budget.
    #[error("No START acknowledgment after {attempts} polls")]
    AckTimeout {
        /// Number of polls performed before giving up.
        attempts: u32,
    },

    /// Device rejected the START command.
    #[error("START rejected by device: response {0:#06x}")]
    StartRejected(u16),

    /// No sector acknowledgment arrived within the polling budget.
    #[error("No acknowledgment for sector {sector} after {attempts} polls")]
    SectorAckTimeout {
        /// Zero-based sector that was awaiting acknowledgment.
        sector: usize,
        /// Number of polls performed before giving up.
        attempts: u32,
    },

    /// Device reported a status code outside the protocol's retry set.
    #[error("Unknown sector status from device: {0:#06x}")]
    UnknownStatus(u16),

    /// A sector kept failing past the configured resend ceiling.
    #[error("Sector {sector} still failing after {attempts} resends")]
    RetryLimitExceeded {
        /// Zero-based sector that exhausted its resends.
        sector: usize,
        /// Resend attempts performed.
        attempts: u32,
    },

    /// Unsupported platform or operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
