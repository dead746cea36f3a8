//! WASM transport implementation using the Web Bluetooth API.
//!
//! This module provides a transport implementation for WASM targets,
//! backing the browser frontend that drives gateway updates from a
//! dashboard page.
//!
//! ## Requirements
//!
//! - Browser with Web Bluetooth support (Chrome, Edge, Opera)
//! - HTTPS or localhost (required for Web Bluetooth)
//! - User gesture to request device access
//!
//! ## GATT layout
//!
//! | Characteristic  | UUID                                   | Perms  |
//! |-----------------|----------------------------------------|--------|
//! | Command write   | `0000b001-0000-1000-8000-00805f9b34fb` | Write  |
//! | Command notify  | `0000b002-0000-1000-8000-00805f9b34fb` | Notify |
//! | Data write      | `0000b003-0000-1000-8000-00805f9b34fb` | Write  |
//! | Data notify     | `0000b004-0000-1000-8000-00805f9b34fb` | Notify |
//! | Commit/restart  | `0000a005-0000-1000-8000-00805f9b34fb` | Write  |
//!
//! ## Note
//!
//! The Web Bluetooth API is inherently asynchronous, while the
//! `Transport` trait is synchronous. Notification delivery maps
//! naturally onto the trait's queue model (the GATT event handler
//! feeds the sender side), but writes need async-to-sync bridging via
//! `wasm-bindgen-futures`.

use crate::error::{Error, Result};
use crate::transport::{Channel, Transport};
use std::sync::mpsc::Receiver;

/// Web Bluetooth transport implementation.
///
/// This is a placeholder for future Web Bluetooth support. The actual
/// implementation will use `web-sys` bindings to the Web Bluetooth
/// API once they stabilize.
pub struct WebBluetoothTransport {
    name: String,
    // TODO: Add web-sys GATT handles
    // device: web_sys::BluetoothDevice,
    // command_char: web_sys::BluetoothRemoteGattCharacteristic,
    // data_char: web_sys::BluetoothRemoteGattCharacteristic,
}

impl WebBluetoothTransport {
    /// Create a new Web Bluetooth transport.
    ///
    /// Note: In WASM, device selection must be initiated by a user
    /// gesture and is asynchronous. This constructor expects the GATT
    /// connection to already be established from JavaScript.
    pub fn new() -> Result<Self> {
        Err(Error::Unsupported(
            "Web Bluetooth support is not yet implemented. \
             Drive the session through an embedder-provided transport instead."
                .to_string(),
        ))
    }

    /// Create from an existing JavaScript BluetoothRemoteGATTServer.
    ///
    /// This is the primary way to create the transport in WASM, as
    /// device selection must be done via JavaScript user interaction.
    ///
    /// Note: This function is only available when targeting WASM and
    /// when the Web Bluetooth API becomes stable in web-sys.
    #[cfg(all(feature = "wasm", target_arch = "wasm32"))]
    pub fn from_js_server(
        _js_server: js_sys::Object, // Generic Object until web-sys stabilizes Bluetooth types
        name: String,
    ) -> Result<Self> {
        // TODO: Implement when web-sys Web Bluetooth support is stable.
        // The Bluetooth types (BluetoothDevice, BluetoothRemoteGATTServer,
        // BluetoothRemoteGATTCharacteristic) are not yet available in
        // stable web-sys. When they land, this function will accept
        // web_sys::BluetoothRemoteGattServer directly and resolve the
        // OTA characteristics from the table above.
        let _ = (_js_server, &name);
        Err(Error::Unsupported(
            "Web Bluetooth support is not yet implemented.".to_string(),
        ))
    }
}

impl Transport for WebBluetoothTransport {
    fn write_frame(&mut self, _channel: Channel, _frame: &[u8]) -> Result<()> {
        // TODO: writeValueWithResponse on the channel's write characteristic,
        // bridged with wasm-bindgen-futures.
        Err(Error::Unsupported(
            "Web Bluetooth write not yet implemented".to_string(),
        ))
    }

    fn subscribe(&mut self, _channel: Channel) -> Result<Receiver<Vec<u8>>> {
        // TODO: startNotifications + characteristicvaluechanged handler
        // feeding the queue's sender side.
        Err(Error::Unsupported(
            "Web Bluetooth notifications not yet implemented".to_string(),
        ))
    }

    fn request_restart(&mut self) -> Result<()> {
        // TODO: single-byte write to the commit characteristic.
        Err(Error::Unsupported(
            "Web Bluetooth restart request not yet implemented".to_string(),
        ))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
