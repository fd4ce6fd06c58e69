//! Recording file reader

use std::fs;
use std::io::Read;
use std::path::Path;

use bytemuck::pod_read_unaligned;
use flate2::read::ZlibDecoder;
use serde_json::Value;

use super::format::{FileHeader, HEADER_SIZE, PAYLOAD_LEN_MAX};
use crate::{PlaybackError, Result};

/// A validated recording file held in memory
pub struct RecordingReader {
    header: FileHeader,
    payload: Vec<u8>,
}

impl RecordingReader {
    /// Open and validate a recording file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, its header is invalid, or
    /// the payload fails its length or CRC check
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_bytes(fs::read(path)?)
    }

    /// Validate an in-memory recording and inflate its payload
    ///
    /// # Errors
    ///
    /// Returns error if the header is invalid, the payload fails its length
    /// or CRC check, or it does not inflate
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(PlaybackError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        let header: FileHeader = pod_read_unaligned(&bytes[..HEADER_SIZE]);
        super::validate_header(&header)?;

        if header.payload_len > PAYLOAD_LEN_MAX {
            return Err(PlaybackError::InvalidFormat(format!(
                "Payload too large: {} > {PAYLOAD_LEN_MAX}",
                header.payload_len
            )));
        }

        let actual_len = (bytes.len() - HEADER_SIZE) as u64;
        if actual_len != header.payload_len {
            return Err(PlaybackError::InvalidFormat(format!(
                "Payload length mismatch: header says {}, file has {actual_len}",
                header.payload_len
            )));
        }

        let payload = bytes.split_off(HEADER_SIZE);
        let computed_crc = crc32fast::hash(&payload);
        if computed_crc != header.payload_crc {
            return Err(PlaybackError::CorruptedData {
                offset: HEADER_SIZE as u64,
                expected: header.payload_crc,
                actual: computed_crc,
            });
        }

        let payload = if header.is_deflated() {
            inflate(&payload)?
        } else {
            payload
        };

        Ok(Self { header, payload })
    }

    /// File header
    #[must_use]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// JSON payload, inflated
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Parse the payload
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not valid JSON
    pub fn document(&self) -> Result<Value> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| PlaybackError::CorruptRecord(format!("recording payload: {e}")))
    }
}

fn inflate(stored: &[u8]) -> Result<Vec<u8>> {
    let mut json = Vec::with_capacity(stored.len() * 4);
    ZlibDecoder::new(stored)
        .take(PAYLOAD_LEN_MAX + 1)
        .read_to_end(&mut json)
        .map_err(|e| PlaybackError::InvalidFormat(format!("Failed to inflate payload: {e}")))?;

    if json.len() as u64 > PAYLOAD_LEN_MAX {
        return Err(PlaybackError::InvalidFormat(format!(
            "Inflated payload too large: more than {PAYLOAD_LEN_MAX} bytes"
        )));
    }
    Ok(json)
}
