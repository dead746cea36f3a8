//! Transport abstraction for the gateway's BLE GATT link.
//!
//! The OTA service exposes two characteristic pairs, each combining a
//! write characteristic (host → device) with a notify characteristic
//! (device → host). The protocol layer addresses them as abstract
//! channels and never touches connection management; discovery,
//! pairing, and GATT plumbing belong to the embedding application.
//!
//! ## Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  Session Layer   |     |  Session Layer   |
//! |  (OTA protocol)  |     |  (OTA protocol)  |
//! +--------+---------+     +--------+---------+
//!          |                        |
//!          v                        v
//! +--------+---------+     +--------+---------+
//! | Transport Trait  |     | Transport Trait  |
//! +--------+---------+     +--------+---------+
//!          |                        |
//!          v                        v
//! +--------+---------+     +--------+---------+
//! |  Gateway device  |     | GatewayEmulator  |
//! | (BLE GATT link)  |     |  (in-process)    |
//! +------------------+     +------------------+
//!      Production            Tests / CLI
//! ```
//!
//! ## Notification queues
//!
//! `subscribe` hands out the receiving end of a FIFO queue. The
//! transport's notification context (a BLE callback thread in
//! production) pushes every frame as it arrives, so a notification
//! delivered before the session starts polling is absorbed by the
//! queue rather than lost. The two channels are FIFO internally but
//! carry no ordering guarantee relative to each other.

#[cfg(feature = "wasm")]
pub mod web;

use std::fmt;
use std::sync::mpsc::Receiver;

use crate::error::Result;

/// The two OTA characteristic pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Command/acknowledge pair: START, END, CANCEL and their acks.
    Command,
    /// Firmware data pair: chunk writes and sector acks.
    Data,
}

impl Channel {
    /// Short channel name for log messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unified transport trait for the OTA link.
///
/// Implementations exist for:
///
/// - The in-process [`GatewayEmulator`](crate::device::GatewayEmulator)
/// - Web Bluetooth via `web-sys` (experimental, `wasm` feature)
pub trait Transport: Send {
    /// Write one frame to a channel, blocking until the transport has
    /// accepted it. Resolution means the write completed, not that the
    /// device acknowledged anything at the protocol level.
    fn write_frame(&mut self, channel: Channel, frame: &[u8]) -> Result<()>;

    /// Subscribe to a channel's notifications.
    ///
    /// Returns the consuming end of the channel's FIFO queue. Each
    /// channel can be subscribed once per connection.
    fn subscribe(&mut self, channel: Channel) -> Result<Receiver<Vec<u8>>>;

    /// Ask the gateway to commit and restart.
    ///
    /// Backed by the commit characteristic in the real system; used
    /// best-effort during cancellation.
    fn request_restart(&mut self) -> Result<()>;

    /// Human-readable transport name for log messages.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::Command.name(), "command");
        assert_eq!(Channel::Data.name(), "data");
        assert_eq!(Channel::Data.to_string(), "data");
    }
}
