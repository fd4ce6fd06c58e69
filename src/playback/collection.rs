//! Ordered responses recorded for one request fingerprint

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::response::{PlaybackResponse, SerializedResponse};
use crate::exchange::LiveResponse;
use crate::{PlaybackError, Result};

/// Stored form of a [`PlaybackResponseCollection`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedCollection {
    /// Request fingerprint
    pub id: String,
    /// URL of the first request seen, for diagnostics
    #[serde(default)]
    pub url: String,
    /// Responses in recording order
    #[serde(default)]
    pub responses: Vec<SerializedResponse>,
}

/// Responses sharing a fingerprint, replayed in the order they were recorded.
///
/// `hits` counts appends while recording and is the read cursor while
/// replaying. It never exceeds the number of responses.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackResponseCollection {
    id: String,
    url: String,
    responses: Vec<PlaybackResponse>,
    hits: usize,
}

impl PlaybackResponseCollection {
    /// Create an empty collection
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            responses: Vec::new(),
            hits: 0,
        }
    }

    /// Restore from the stored form; the cursor starts at the first response
    ///
    /// # Errors
    ///
    /// Returns error if a response fails to decode
    pub fn deserialize(record: SerializedCollection) -> Result<Self> {
        let responses = record
            .responses
            .into_iter()
            .map(PlaybackResponse::deserialize)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: record.id,
            url: record.url,
            responses,
            hits: 0,
        })
    }

    /// Stored form
    #[must_use]
    pub fn serialize(&self) -> SerializedCollection {
        SerializedCollection {
            id: self.id.clone(),
            url: self.url.clone(),
            responses: self.responses.iter().map(PlaybackResponse::serialize).collect(),
        }
    }

    /// Append a live response
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be recorded
    pub fn add_response(&mut self, response: LiveResponse) -> Result<()> {
        self.push(PlaybackResponse::from_live(response)?);
        Ok(())
    }

    pub(crate) fn push(&mut self, response: PlaybackResponse) {
        self.responses.push(response);
        self.hits += 1;
        debug!(collection = %self.id, hits = self.hits, "Recorded response");
    }

    /// Return the response under the cursor and advance it
    ///
    /// # Errors
    ///
    /// Returns error if every response has already been replayed
    pub fn get_next_response(&mut self) -> Result<&PlaybackResponse> {
        let index = self.hits;
        let Some(response) = self.responses.get(index) else {
            return Err(PlaybackError::ExhaustedReplay {
                url: self.url.clone(),
                index,
            });
        };
        self.hits += 1;
        debug!(collection = %self.id, index, "Replaying response");
        Ok(response)
    }

    /// Request fingerprint
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Diagnostic URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cursor position
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Recorded responses
    #[must_use]
    pub fn responses(&self) -> &[PlaybackResponse] {
        &self.responses
    }
}
