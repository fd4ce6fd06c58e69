//! Recording persistence
//!
//! A recording file is a fixed header followed by the JSON document of one
//! test. [`FileStore`] maps `(spec file, test title)` to such a file.

mod format;
pub mod path;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

pub use format::{FileHeader, FILE_MAGIC, FILE_VERSION, FLAG_DEFLATE, HEADER_SIZE, PAYLOAD_LEN_MAX};
pub use reader::RecordingReader;
pub use writer::RecordingWriter;

use crate::config::Config;
use crate::playback::PlaybackDocument;
use crate::{PlaybackError, Result};

/// Validate recording file magic, version and flags
///
/// # Errors
///
/// Returns error if magic or version is invalid, or unknown flags are set
pub fn validate_header(header: &FileHeader) -> Result<()> {
    if header.magic != FILE_MAGIC {
        return Err(PlaybackError::InvalidFormat(format!(
            "Invalid magic bytes: expected {:?}, got {:?}",
            FILE_MAGIC, header.magic
        )));
    }

    if header.version != FILE_VERSION {
        return Err(PlaybackError::InvalidFormat(format!(
            "Unsupported version: {}, expected {}",
            header.version, FILE_VERSION
        )));
    }

    if header.flags & !FLAG_DEFLATE != 0 {
        return Err(PlaybackError::InvalidFormat(format!(
            "Unknown payload flags: {:#x}",
            header.flags
        )));
    }

    Ok(())
}

/// Where request maps are kept between runs
pub trait RecordingStore {
    /// Stored document for a test, `None` if nothing was recorded yet
    ///
    /// # Errors
    ///
    /// Returns error if a stored recording exists but cannot be read
    fn load(&self, file: &str, title: &str) -> Result<Option<Value>>;

    /// Replace the stored document for a test
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be written
    fn save(&self, file: &str, title: &str, document: &PlaybackDocument) -> Result<()>;
}

/// Recording files on the local filesystem
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
    fixtures_dir: Option<PathBuf>,
}

impl FileStore {
    /// Store resolving relative paths against `base_dir`
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, fixtures_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            fixtures_dir,
        }
    }

    /// Store using the configured fixtures directory
    #[must_use]
    pub fn from_config(config: &Config, base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, config.fixtures_dir.clone())
    }

    /// Recording file for a test
    ///
    /// # Errors
    ///
    /// Returns error if the title cannot name a file
    pub fn path_for(&self, file: &str, title: &str) -> Result<PathBuf> {
        path::recording_path(
            &self.base_dir,
            self.fixtures_dir.as_deref(),
            Path::new(file),
            title,
        )
    }
}

impl RecordingStore for FileStore {
    fn load(&self, file: &str, title: &str) -> Result<Option<Value>> {
        let path = self.path_for(file, title)?;
        if !path.exists() {
            return Ok(None);
        }

        let reader = RecordingReader::open(&path)?;
        info!(path = %path.display(), bytes = reader.payload().len(), "Loaded recording");
        reader.document().map(Some)
    }

    fn save(&self, file: &str, title: &str, document: &PlaybackDocument) -> Result<()> {
        let path = self.path_for(file, title)?;
        let written = RecordingWriter::new(&path).write(document)?;
        info!(
            path = %path.display(),
            bytes = written,
            matchers = document.matchers.len(),
            "Saved recording"
        );
        Ok(())
    }
}
