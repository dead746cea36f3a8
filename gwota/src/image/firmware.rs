//! Firmware image loading.

use crate::error::{Error, Result};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A firmware image selected for upload.
///
/// The image is immutable for the lifetime of the upload session; the
/// splitter borrows it and the session drops it when the run ends.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Load a firmware image from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        debug!(
            "Loaded firmware image: {} ({} bytes)",
            path.as_ref().display(),
            data.len()
        );

        Self::from_bytes(data)
    }

    /// Wrap raw image bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidImage("image is empty".into()));
        }
        Ok(Self { data })
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image holds no bytes. Construction rejects empty
    /// images, so this is always false for a live instance.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Image size as transmitted in the START frame argument.
    #[allow(clippy::cast_possible_truncation)] // firmware images are far below 4 GiB
    pub fn wire_len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
