//! Transport-facing request and response views
//!
//! The interception layer decodes traffic into these structures before
//! handing it to the engine. Nothing here knows about fingerprints or
//! recordings.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;

/// Header map as seen by the transport (lower-cased names by convention)
pub type Headers = BTreeMap<String, String>;

/// A live outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct LiveRequest {
    /// Absolute request URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Request headers
    pub headers: Headers,
    /// Decoded request body; strings are used verbatim for fingerprinting
    pub body: Option<Value>,
}

impl LiveRequest {
    /// Build a request with no headers
    pub fn new(method: impl Into<String>, url: impl Into<String>, body: impl Into<Value>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: Headers::new(),
            body: Some(body.into()),
        }
    }
}

/// A live response body
#[derive(Debug, Clone, PartialEq)]
pub enum LiveBody {
    /// Raw bytes (images, archives, anything not decoded)
    Bytes(Bytes),
    /// Decoded value
    Value(Value),
}

impl From<Value> for LiveBody {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Bytes> for LiveBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for LiveBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&str> for LiveBody {
    fn from(text: &str) -> Self {
        Self::Value(Value::String(text.to_string()))
    }
}

/// A live response received for an intercepted request
#[derive(Debug, Clone, PartialEq)]
pub struct LiveResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Reason phrase
    pub status_message: String,
    /// Response headers
    pub headers: Headers,
    /// Response body, if any
    pub body: Option<LiveBody>,
}

impl LiveResponse {
    /// Build a response with no headers
    pub fn new(status_code: u16, status_message: impl Into<String>, body: Option<LiveBody>) -> Self {
        Self {
            status_code,
            status_message: status_message.into(),
            headers: Headers::new(),
            body,
        }
    }

    /// Whether the status code is in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
