//! Recorded HTTP responses and the body codec

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::exchange::{Headers, LiveBody, LiveResponse};
use crate::{PlaybackError, Result};

/// Codec tag stored next to every body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Object or array, stored as JSON text
    Json,
    /// String, stored literally
    String,
    /// Number, stored literally
    Number,
    /// Boolean, stored literally
    Boolean,
    /// Byte buffer, stored as base64
    Binary,
}

impl BodyType {
    /// Tag as written to disk
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Binary => "binary",
        }
    }

    /// Parse a stored tag; `ArrayBuffer` is the older spelling of `binary`
    ///
    /// # Errors
    ///
    /// Returns error if the tag is unknown
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "json" => Ok(Self::Json),
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "binary" | "ArrayBuffer" => Ok(Self::Binary),
            other => Err(PlaybackError::CorruptRecord(format!(
                "cannot decode unknown body type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Object or array
    Json(Value),
    /// Text
    String(String),
    /// Number
    Number(Number),
    /// Boolean
    Boolean(bool),
    /// Raw bytes
    Binary(Bytes),
}

impl ResponseBody {
    /// Classify a live body.
    ///
    /// Byte buffers are recognized before anything structured, so a buffer is
    /// never recorded as JSON.
    ///
    /// # Errors
    ///
    /// Returns error for a JSON `null` value
    pub fn from_live(body: LiveBody) -> Result<Self> {
        match body {
            LiveBody::Bytes(bytes) => Ok(Self::Binary(bytes)),
            LiveBody::Value(value) => match value {
                Value::Object(_) | Value::Array(_) => Ok(Self::Json(value)),
                Value::String(text) => Ok(Self::String(text)),
                Value::Number(number) => Ok(Self::Number(number)),
                Value::Bool(flag) => Ok(Self::Boolean(flag)),
                Value::Null => Err(PlaybackError::UnsupportedBodyType("null".to_string())),
            },
        }
    }

    /// Codec tag for this body
    #[must_use]
    pub fn body_type(&self) -> BodyType {
        match self {
            Self::Json(_) => BodyType::Json,
            Self::String(_) => BodyType::String,
            Self::Number(_) => BodyType::Number,
            Self::Boolean(_) => BodyType::Boolean,
            Self::Binary(_) => BodyType::Binary,
        }
    }

    /// Wire form of the body
    #[must_use]
    pub fn encode(&self) -> Value {
        match self {
            Self::Json(value) => Value::String(value.to_string()),
            Self::String(text) => Value::String(text.clone()),
            Self::Number(number) => Value::Number(number.clone()),
            Self::Boolean(flag) => Value::Bool(*flag),
            Self::Binary(bytes) => Value::String(BASE64.encode(bytes)),
        }
    }

    /// Inverse of [`encode`](Self::encode)
    ///
    /// # Errors
    ///
    /// Returns error if the wire value does not fit the tag
    pub fn decode(wire: Value, body_type: BodyType) -> Result<Self> {
        let mismatch = |wire: &Value| {
            PlaybackError::CorruptRecord(format!("{body_type} body stored as {wire}"))
        };
        match (body_type, wire) {
            (BodyType::Json, Value::String(text)) => serde_json::from_str(&text)
                .map(Self::Json)
                .map_err(|e| PlaybackError::CorruptRecord(format!("json body: {e}"))),
            (BodyType::String, Value::String(text)) => Ok(Self::String(text)),
            (BodyType::Number, Value::Number(number)) => Ok(Self::Number(number)),
            (BodyType::Boolean, Value::Bool(flag)) => Ok(Self::Boolean(flag)),
            (BodyType::Binary, Value::String(text)) => BASE64
                .decode(text.as_bytes())
                .map(|bytes| Self::Binary(Bytes::from(bytes)))
                .map_err(|e| PlaybackError::CorruptRecord(format!("binary body: {e}"))),
            (_, wire) => Err(mismatch(&wire)),
        }
    }

    /// Body as the transport should send it
    #[must_use]
    pub fn into_live(self) -> LiveBody {
        match self {
            Self::Json(value) => LiveBody::Value(value),
            Self::String(text) => LiveBody::Value(Value::String(text)),
            Self::Number(number) => LiveBody::Value(Value::Number(number)),
            Self::Boolean(flag) => LiveBody::Value(Value::Bool(flag)),
            Self::Binary(bytes) => LiveBody::Bytes(bytes),
        }
    }
}

/// Stored form of a [`PlaybackResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Reason phrase
    #[serde(default)]
    pub status_message: String,
    /// Encoded body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Codec tag for `body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
    /// Response headers
    #[serde(default)]
    pub headers: Headers,
}

/// One recorded HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackResponse {
    status_code: u16,
    status_message: String,
    headers: Headers,
    body: Option<ResponseBody>,
}

impl PlaybackResponse {
    /// Snapshot a live response
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be recorded
    pub fn from_live(response: LiveResponse) -> Result<Self> {
        let body = response.body.map(ResponseBody::from_live).transpose()?;
        Ok(Self {
            status_code: response.status_code,
            status_message: response.status_message,
            headers: response.headers,
            body,
        })
    }

    /// Restore from the stored form
    ///
    /// # Errors
    ///
    /// Returns error if the body tag is unknown or the body does not decode
    pub fn deserialize(record: SerializedResponse) -> Result<Self> {
        let body = match (record.body, record.body_type) {
            (Some(wire), Some(tag)) => Some(ResponseBody::decode(wire, BodyType::from_tag(&tag)?)?),
            (None, None | Some(_)) => None,
            (Some(_), None) => {
                return Err(PlaybackError::CorruptRecord(
                    "response body stored without a body type".to_string(),
                ))
            }
        };

        Ok(Self {
            status_code: record.status_code,
            status_message: record.status_message,
            headers: record.headers,
            body,
        })
    }

    /// Stored form
    #[must_use]
    pub fn serialize(&self) -> SerializedResponse {
        SerializedResponse {
            status_code: self.status_code,
            status_message: self.status_message.clone(),
            body: self.body.as_ref().map(ResponseBody::encode),
            body_type: self.body_type().map(|t| t.as_str().to_string()),
            headers: self.headers.clone(),
        }
    }

    /// HTTP status code
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Reason phrase
    #[must_use]
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Response headers
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable headers, for transports that adjust them before replay
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Decoded body
    #[must_use]
    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    /// Codec tag, fixed at construction
    #[must_use]
    pub fn body_type(&self) -> Option<BodyType> {
        self.body.as_ref().map(ResponseBody::body_type)
    }

    /// Convert back into a response the transport can send
    #[must_use]
    pub fn into_live(self) -> LiveResponse {
        LiveResponse {
            status_code: self.status_code,
            status_message: self.status_message,
            headers: self.headers,
            body: self.body.map(ResponseBody::into_live),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CHEESE: [u8; 6] = [0x63, 0x68, 0x65, 0x65, 0x73, 0x65];

    fn live(body: Option<LiveBody>) -> LiveResponse {
        let mut response = LiveResponse::new(200, "OK", body);
        response.headers.insert("mock-header".to_string(), "yes".to_string());
        response
    }

    fn stored(body: Value, body_type: &str) -> SerializedResponse {
        SerializedResponse {
            status_code: 200,
            status_message: "OK".to_string(),
            body: Some(body),
            body_type: Some(body_type.to_string()),
            headers: Headers::from([("mock-header".to_string(), "yes".to_string())]),
        }
    }

    #[test]
    fn test_from_live() {
        let response = PlaybackResponse::from_live(live(Some(json!({ "foo": "bar" }).into()))).unwrap();

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.status_message(), "OK");
        assert_eq!(response.body(), Some(&ResponseBody::Json(json!({ "foo": "bar" }))));
        assert_eq!(response.body_type(), Some(BodyType::Json));
        assert_eq!(response.headers()["mock-header"], "yes");
    }

    #[test]
    fn test_serialize_body_types() {
        let cases: Vec<(LiveBody, &str, Value)> = vec![
            (json!({ "foo": "bar" }).into(), "json", json!("{\"foo\":\"bar\"}")),
            (json!(["a", 1]).into(), "json", json!("[\"a\",1]")),
            ("body-string".into(), "string", json!("body-string")),
            (json!(12.5).into(), "number", json!(12.5)),
            (json!(false).into(), "boolean", json!(false)),
            (CHEESE.to_vec().into(), "binary", json!("Y2hlZXNl")),
        ];

        for (body, body_type, expected) in cases {
            let serialized = PlaybackResponse::from_live(live(Some(body))).unwrap().serialize();
            assert_eq!(serialized.body_type.as_deref(), Some(body_type));
            assert_eq!(serialized.body, Some(expected));
            assert_eq!(serialized.headers["mock-header"], "yes");
        }
    }

    #[test]
    fn test_deserialize_body_types() {
        let json = PlaybackResponse::deserialize(stored(json!("{\"foo\":\"bar\"}"), "json")).unwrap();
        assert_eq!(json.body(), Some(&ResponseBody::Json(json!({ "foo": "bar" }))));

        let text = PlaybackResponse::deserialize(stored(json!("body-string"), "string")).unwrap();
        assert_eq!(text.body(), Some(&ResponseBody::String("body-string".to_string())));

        let binary = PlaybackResponse::deserialize(stored(json!("Y2hlZXNl"), "binary")).unwrap();
        assert_eq!(binary.body(), Some(&ResponseBody::Binary(Bytes::from_static(&CHEESE))));

        let legacy = PlaybackResponse::deserialize(stored(json!("Y2hlZXNl"), "ArrayBuffer")).unwrap();
        assert_eq!(legacy.body_type(), Some(BodyType::Binary));

        let number = PlaybackResponse::deserialize(stored(json!(42.5), "number")).unwrap();
        assert_eq!(number.body(), Some(&ResponseBody::Number(Number::from_f64(42.5).unwrap())));

        let flag = PlaybackResponse::deserialize(stored(json!(false), "boolean")).unwrap();
        assert_eq!(flag.body(), Some(&ResponseBody::Boolean(false)));
    }

    #[test]
    fn test_scalar_tags_reject_wrong_type() {
        let number = PlaybackResponse::deserialize(stored(json!("42"), "number")).unwrap_err();
        assert!(matches!(number, PlaybackError::CorruptRecord(_)));

        let flag = PlaybackResponse::deserialize(stored(json!("true"), "boolean")).unwrap_err();
        assert!(matches!(flag, PlaybackError::CorruptRecord(_)));
    }

    #[test]
    fn test_absent_body() {
        let response = PlaybackResponse::from_live(live(None)).unwrap();
        let serialized = response.serialize();
        assert!(serialized.body.is_none());
        assert!(serialized.body_type.is_none());

        let encoded = serde_json::to_value(&serialized).unwrap();
        assert!(encoded.get("body").is_none());
        assert_eq!(PlaybackResponse::deserialize(serialized).unwrap(), response);
    }

    #[test]
    fn test_null_body_unsupported() {
        let err = PlaybackResponse::from_live(live(Some(Value::Null.into()))).unwrap_err();
        assert!(matches!(err, PlaybackError::UnsupportedBodyType(_)));
    }

    #[test]
    fn test_corrupt_records() {
        let unknown = PlaybackResponse::deserialize(stored(json!("x"), "xml")).unwrap_err();
        assert!(matches!(unknown, PlaybackError::CorruptRecord(_)));

        let mismatched = PlaybackResponse::deserialize(stored(json!(5), "string")).unwrap_err();
        assert!(matches!(mismatched, PlaybackError::CorruptRecord(_)));

        let bad_base64 = PlaybackResponse::deserialize(stored(json!("***"), "binary")).unwrap_err();
        assert!(matches!(bad_base64, PlaybackError::CorruptRecord(_)));
    }

    #[test]
    fn test_into_live() {
        let response = PlaybackResponse::from_live(live(Some(CHEESE.to_vec().into()))).unwrap();
        let live = response.into_live();
        assert_eq!(live.body, Some(LiveBody::Bytes(Bytes::from_static(&CHEESE))));
    }
}
