//! Recording file writer

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytemuck::bytes_of;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use super::format::{FileHeader, FLAG_DEFLATE};
use crate::playback::PlaybackDocument;
use crate::{PlaybackError, Result};

/// Writes one recording file atomically
pub struct RecordingWriter {
    path: PathBuf,
}

impl RecordingWriter {
    /// Writer targeting `path`
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Encode and deflate `document`, write it to `<path>.tmp` and rename it
    /// into place. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be encoded or the file cannot be
    /// written
    pub fn write(self, document: &PlaybackDocument) -> Result<u64> {
        let json = serde_json::to_vec(document)
            .map_err(|e| PlaybackError::InvalidFormat(format!("Failed to encode recording: {e}")))?;
        let payload = deflate(&json)?;
        let header = FileHeader::for_payload(&payload, FLAG_DEFLATE);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(bytes_of(&header))?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            path = %self.path.display(),
            json_bytes = json.len(),
            stored_bytes = payload.len(),
            "Wrote recording"
        );
        Ok((bytes_of(&header).len() + payload.len()) as u64)
    }
}

fn deflate(json: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder.write_all(json)?;
    Ok(encoder.finish()?)
}
