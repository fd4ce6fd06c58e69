//! Error types for Playback

use std::io;
use thiserror::Error;

/// Result type for Playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Errors that can occur in Playback
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Wrong argument supplied to a constructor
    #[error("Invalid arguments: {0}")]
    InvalidArgument(String),

    /// Matcher declaration is inconsistent
    #[error("Invalid request matcher: {0}")]
    InvalidMatcher(String),

    /// Request URL could not be split into its attributes
    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl {
        /// URL as received from the transport
        url: String,
        /// Why parsing failed
        reason: String,
    },

    /// Fingerprinting needs a request body
    #[error("Request body must be provided. Url: {url}")]
    MissingRequestBody {
        /// URL of the offending request
        url: String,
    },

    /// No matcher registered under this id
    #[error("No request matcher found with id: {0}")]
    MatcherNotFound(String),

    /// The matcher has no collection for this request fingerprint
    #[error("No response found for matcher {matcher_id} with URL: {url}")]
    ResponseNotFound {
        /// Matcher that was searched
        matcher_id: String,
        /// URL of the request that missed
        url: String,
    },

    /// Mutation attempted after `seal()`
    #[error("Cannot {action} sealed request map. {detail}")]
    Sealed {
        /// What was attempted
        action: &'static str,
        /// Matcher or URL involved
        detail: String,
    },

    /// A second response was recorded under an `anyOnce` matcher
    #[error("Request matcher {matcher_id} has \"matching.anyOnce\" set but recorded more than one response")]
    AnyOnceViolation {
        /// Matcher id
        matcher_id: String,
    },

    /// More live calls than recorded responses
    #[error("No more recorded responses found for request with URL: {url}. Hit index: {index}")]
    ExhaustedReplay {
        /// Diagnostic URL of the collection
        url: String,
        /// Index that was attempted
        index: usize,
    },

    /// Completion reported without a matching start
    #[error("No requests inflight for matcher {0}")]
    NoRequestsInflight(String),

    /// A live body value cannot be recorded
    #[error("Unsupported body type: {0}")]
    UnsupportedBodyType(String),

    /// Stored playback data is inconsistent
    #[error("Corrupt playback record: {0}")]
    CorruptRecord(String),

    /// Invalid recording file format
    #[error("Invalid recording format: {0}")]
    InvalidFormat(String),

    /// Recording file corrupted (CRC mismatch)
    #[error("Recording corrupted at offset {offset}: expected CRC {expected:#x}, got {actual:#x}")]
    CorruptedData {
        /// Offset where corruption was detected
        offset: u64,
        /// Expected CRC32 value
        expected: u32,
        /// Actual CRC32 value
        actual: u32,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid test name
    #[error("Invalid test name: {0}")]
    InvalidTestName(String),

    /// Requests were still outstanding when the test finished
    #[error("{} pending requests: {}", .0.len(), .0.join(", "))]
    PendingRequests(Vec<String>),
}

impl PlaybackError {
    /// Whether a hybrid run may fall back to a live request for this error
    #[must_use]
    pub fn is_replay_miss(&self) -> bool {
        matches!(
            self,
            Self::ResponseNotFound { .. } | Self::ExhaustedReplay { .. }
        )
    }
}
