//! Per-test container of request matchers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::collection::PlaybackResponseCollection;
use super::matcher::{MatcherOptions, PlaybackRequestMatcher, SerializedMatcher};
use super::response::PlaybackResponse;
use super::SERIALIZE_VERSION;
use crate::exchange::{LiveRequest, LiveResponse};
use crate::fingerprint::{self, MatchingIgnores, RoutePattern};
use crate::{PlaybackError, Result};

/// Versioned document written for one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackDocument {
    /// Layout version, see [`SERIALIZE_VERSION`]
    pub version: u32,
    /// Matchers in declaration order
    pub matchers: Vec<SerializedMatcher>,
}

/// All matchers of one test, identified by spec file and test title.
///
/// Once sealed, stale matchers are gone and nothing new can be recorded.
#[derive(Debug)]
pub struct PlaybackRequestMap {
    file: String,
    title: String,
    matchers: Vec<PlaybackRequestMatcher>,
    sealed: bool,
}

impl PlaybackRequestMap {
    /// Create an empty map
    ///
    /// # Errors
    ///
    /// Returns error if `file` or `title` is empty
    pub fn new(file: impl Into<String>, title: impl Into<String>) -> Result<Self> {
        let file = file.into();
        let title = title.into();
        if file.is_empty() || title.is_empty() {
            return Err(PlaybackError::InvalidArgument(
                "request map needs both a file and a title".to_string(),
            ));
        }

        Ok(Self {
            file,
            title,
            matchers: Vec::new(),
            sealed: false,
        })
    }

    /// Create a map from a stored document.
    ///
    /// A document of another version is discarded with a warning and the map
    /// starts empty.
    ///
    /// # Errors
    ///
    /// Returns error if `file` or `title` is empty, or a current-version
    /// document is malformed
    pub fn from_document(file: impl Into<String>, title: impl Into<String>, mut data: Value) -> Result<Self> {
        let mut map = Self::new(file, title)?;

        let version = data.get("version").and_then(Value::as_u64);
        if version != Some(u64::from(SERIALIZE_VERSION)) {
            let found = version.map_or_else(|| "none".to_string(), |v| v.to_string());
            warn!(
                file = %map.file,
                title = %map.title,
                "Request data version is out-of-date. Data version \"{found}\", current version is \"{SERIALIZE_VERSION}\""
            );
            return Ok(map);
        }

        let matchers = match data.get_mut("matchers").map(Value::take) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(PlaybackError::CorruptRecord(format!(
                    "\"matchers\" must be an array, found {other}"
                )))
            }
        };
        for entry in matchers {
            map.matchers.push(PlaybackRequestMatcher::deserialize(entry)?);
        }

        debug!(file = %map.file, title = %map.title, matchers = map.matchers.len(), "Restored request map");
        Ok(map)
    }

    /// Declare a matcher, or revive the identical one already present
    ///
    /// # Errors
    ///
    /// Returns error if the map is sealed or the declaration is invalid
    pub fn add(&mut self, method: &str, pattern: RoutePattern, options: MatcherOptions) -> Result<String> {
        if self.sealed {
            return Err(PlaybackError::Sealed {
                action: "add request matcher to",
                detail: format!("Matcher: {}", pattern.as_matcher_string()),
            });
        }

        let declared = PlaybackRequestMatcher::new(method, pattern, options)?;
        let id = declared.id().to_string();
        match self.matchers.iter_mut().find(|m| m.id() == id) {
            Some(existing) => existing.revive(declared),
            None => {
                debug!(matcher = %id, method, pattern = %declared.matcher(), "Declared request matcher");
                self.matchers.push(declared);
            }
        }
        Ok(id)
    }

    /// Record a live response under a matcher
    ///
    /// # Errors
    ///
    /// Returns error if the map is sealed, the id is unknown, or recording
    /// fails
    pub fn add_response(&mut self, matcher_id: &str, request: &LiveRequest, response: LiveResponse) -> Result<()> {
        if self.sealed {
            return Err(PlaybackError::Sealed {
                action: "add response to",
                detail: format!("Url: {}", request.url),
            });
        }
        self.matcher_mut(matcher_id)?.add_response(request, response)
    }

    /// Collection a request resolves to; `ignores` overrides the matcher's own
    ///
    /// # Errors
    ///
    /// Returns error if the id is unknown or nothing was recorded for the
    /// request
    pub fn get_response_collection(
        &mut self,
        matcher_id: &str,
        request: &LiveRequest,
        ignores: Option<&MatchingIgnores>,
    ) -> Result<&mut PlaybackResponseCollection> {
        let matcher = self.matcher_mut(matcher_id)?;
        let fingerprint = {
            let ignores = ignores.unwrap_or_else(|| matcher.ignores());
            fingerprint::request_fingerprint(request, ignores)?
        };
        matcher.get_response_collection(&fingerprint, &request.url)
    }

    /// Next recorded response for a request
    ///
    /// # Errors
    ///
    /// Returns error if the id is unknown, nothing was recorded for the
    /// request, or its responses are used up
    pub fn get_response(
        &mut self,
        matcher_id: &str,
        request: &LiveRequest,
        ignores: Option<&MatchingIgnores>,
    ) -> Result<&PlaybackResponse> {
        self.get_response_collection(matcher_id, request, ignores)?
            .get_next_response()
    }

    /// # Errors
    ///
    /// Returns error if the id is unknown
    pub fn notify_request_started(&mut self, matcher_id: &str) -> Result<()> {
        self.matcher_mut(matcher_id)?.notify_request_started();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns error if the id is unknown or nothing is in flight
    pub fn notify_request_completed(&mut self, matcher_id: &str) -> Result<()> {
        self.matcher_mut(matcher_id)?.notify_request_completed()
    }

    /// Whether any matcher still expects traffic
    #[must_use]
    pub fn has_pending_requests(&self) -> bool {
        self.matchers.iter().any(PlaybackRequestMatcher::is_pending)
    }

    /// Matchers that still expect traffic
    pub fn pending_requests(&self) -> impl Iterator<Item = &PlaybackRequestMatcher> {
        self.matchers.iter().filter(|m| m.is_pending())
    }

    /// All matchers, in declaration order
    #[must_use]
    pub fn matchers(&self) -> &[PlaybackRequestMatcher] {
        &self.matchers
    }

    /// Matcher by id
    #[must_use]
    pub fn matcher(&self, matcher_id: &str) -> Option<&PlaybackRequestMatcher> {
        self.matchers.iter().find(|m| m.id() == matcher_id)
    }

    /// Id of the first declared matcher covering a live request
    #[must_use]
    pub fn route(&self, method: &str, url: &str) -> Option<&str> {
        self.matchers
            .iter()
            .find(|m| m.routes(method, url))
            .map(PlaybackRequestMatcher::id)
    }

    /// Drop stale matchers and refuse further recording. Idempotent.
    pub fn seal(&mut self) {
        let before = self.matchers.len();
        self.matchers.retain(|m| !m.is_stale());
        if !self.sealed {
            debug!(
                file = %self.file,
                title = %self.title,
                removed = before - self.matchers.len(),
                "Sealed request map"
            );
        }
        self.sealed = true;
    }

    /// Whether [`seal`](Self::seal) was called
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Stored form
    #[must_use]
    pub fn serialize(&self) -> PlaybackDocument {
        PlaybackDocument {
            version: SERIALIZE_VERSION,
            matchers: self.matchers.iter().map(PlaybackRequestMatcher::serialize).collect(),
        }
    }

    /// Spec file the map belongs to
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Test title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    fn matcher_mut(&mut self, matcher_id: &str) -> Result<&mut PlaybackRequestMatcher> {
        self.matchers
            .iter_mut()
            .find(|m| m.id() == matcher_id)
            .ok_or_else(|| PlaybackError::MatcherNotFound(matcher_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::RequestAttribute;
    use crate::playback::{MatchingOptions, ResponseBody};
    use serde_json::json;

    fn map() -> PlaybackRequestMap {
        PlaybackRequestMap::new("cypress/integration/app.spec.js", "loads todos").unwrap()
    }

    fn request(path: &str) -> LiveRequest {
        LiveRequest::new("GET", format!("https://example.com{path}"), "")
    }

    fn ok(body: Value) -> LiveResponse {
        LiveResponse::new(200, "OK", Some(body.into()))
    }

    fn reload(map: &PlaybackRequestMap) -> PlaybackRequestMap {
        let data = serde_json::to_value(map.serialize()).unwrap();
        PlaybackRequestMap::from_document(map.file(), map.title(), data).unwrap()
    }

    #[test]
    fn test_requires_file_and_title() {
        assert!(PlaybackRequestMap::new("", "t").is_err());
        assert!(PlaybackRequestMap::new("f", "").is_err());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut map = map();
        let a = map.add("GET", "/todos".into(), MatcherOptions::default()).unwrap();
        let b = map.add("GET", "/todos".into(), MatcherOptions::default()).unwrap();
        let c = map.add("POST", "/todos".into(), MatcherOptions::default()).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(map.matchers().len(), 2);
    }

    #[test]
    fn test_unknown_matcher_id() {
        let mut map = map();
        let err = map.notify_request_started("missing").unwrap_err();
        assert_eq!(err.to_string(), "No request matcher found with id: missing");

        assert!(map.add_response("missing", &request("/"), ok(json!(1))).is_err());
        assert!(map.get_response("missing", &request("/"), None).is_err());
    }

    #[test]
    fn test_record_and_replay() {
        let mut map = map();
        let id = map.add("GET", "/todos/*".into(), MatcherOptions::default()).unwrap();
        map.add_response(&id, &request("/todos/1"), ok(json!({ "id": 1 }))).unwrap();
        map.add_response(&id, &request("/todos/2"), ok(json!({ "id": 2 }))).unwrap();

        let mut replay = reload(&map);
        let second = replay.get_response(&id, &request("/todos/2"), None).unwrap();
        assert_eq!(second.body(), Some(&ResponseBody::Json(json!({ "id": 2 }))));

        let err = replay.get_response(&id, &request("/todos/3"), None).unwrap_err();
        assert!(err.is_replay_miss());
    }

    #[test]
    fn test_caller_ignores_override() {
        let options = MatcherOptions {
            matching: Some(MatchingOptions {
                any_once: None,
                ignores: Some(MatchingIgnores::from(vec![RequestAttribute::Search])),
            }),
            ..MatcherOptions::default()
        };
        let mut map = map();
        let id = map.add("GET", "/todos".into(), options).unwrap();
        map.add_response(&id, &request("/todos?page=1"), ok(json!([]))).unwrap();

        let mut replay = reload(&map);
        let strict = MatchingIgnores::default();
        let err = replay
            .get_response(&id, &request("/todos?page=9"), Some(&strict))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::ResponseNotFound { .. }));
        assert!(replay.get_response(&id, &request("/todos?page=9"), None).is_ok());
    }

    #[test]
    fn test_seal_removes_stale_only() {
        let mut recorded = map();
        let touched = recorded.add("GET", "/a".into(), MatcherOptions::default()).unwrap();
        let redeclared = recorded.add("GET", "/b".into(), MatcherOptions::default()).unwrap();
        let untouched = recorded.add("GET", "/c".into(), MatcherOptions::default()).unwrap();

        let mut map = reload(&recorded);
        assert!(map.matchers().iter().all(PlaybackRequestMatcher::is_stale));
        assert!(!map.has_pending_requests());

        map.notify_request_started(&touched).unwrap();
        map.add("GET", "/b".into(), MatcherOptions::default()).unwrap();

        map.seal();
        map.seal();

        assert!(map.is_sealed());
        assert!(map.matcher(&touched).is_some());
        assert!(map.matcher(&redeclared).is_some());
        assert!(map.matcher(&untouched).is_none());
    }

    #[test]
    fn test_sealed_map_rejects_mutation() {
        let mut map = map();
        let id = map.add("GET", "/todos".into(), MatcherOptions::default()).unwrap();
        map.seal();

        let err = map.add("GET", "/other".into(), MatcherOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot add request matcher to sealed request map. Matcher: /other"
        );

        let err = map.add_response(&id, &request("/todos"), ok(json!(1))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot add response to sealed request map. Url: https://example.com/todos"
        );
    }

    #[test]
    fn test_version_mismatch_yields_empty_map() {
        let mut map = map();
        map.add("GET", "/todos".into(), MatcherOptions::default()).unwrap();
        let mut data = serde_json::to_value(map.serialize()).unwrap();
        data["version"] = json!(0);

        let restored = PlaybackRequestMap::from_document("f", "t", data).unwrap();
        assert!(restored.matchers().is_empty());

        let missing = PlaybackRequestMap::from_document("f", "t", json!({ "matchers": [] })).unwrap();
        assert!(missing.matchers().is_empty());
    }

    #[test]
    fn test_legacy_matchers_without_route() {
        let responses = |n: usize| {
            (1..=n)
                .map(|j| {
                    json!({
                        "id": format!("response-{j}"),
                        "statusCode": 200,
                        "statusMessage": "OK",
                        "body": "body-string",
                        "bodyType": "string",
                        "headers": { "mock-header": "yes" }
                    })
                })
                .collect::<Vec<_>>()
        };
        let data = json!({
            "version": 1,
            "matchers": [{ "id": "request-1", "minTimes": 2, "responses": responses(2) }]
        });

        let map = PlaybackRequestMap::from_document("f", "t", data).unwrap();
        assert_eq!(map.matchers().len(), 1);
        let matcher = map.matcher("request-1").unwrap();
        assert_eq!(matcher.at_least(), 2);
        assert_eq!(matcher.collections().len(), 2);
        assert!(matcher.is_stale());
    }

    #[test]
    fn test_malformed_current_version() {
        let err = PlaybackRequestMap::from_document("f", "t", json!({ "version": 1, "matchers": 5 })).unwrap_err();
        assert!(matches!(err, PlaybackError::CorruptRecord(_)));

        let err = PlaybackRequestMap::from_document("f", "t", json!({ "version": 1, "matchers": [{}] })).unwrap_err();
        assert!(matches!(err, PlaybackError::CorruptRecord(_)));
    }

    #[test]
    fn test_pending_requests() {
        let mut map = map();
        let id = map.add("GET", "/todos".into(), MatcherOptions::default()).unwrap();
        assert!(map.has_pending_requests());
        assert_eq!(map.pending_requests().count(), 1);

        map.notify_request_started(&id).unwrap();
        map.add_response(&id, &request("/todos"), ok(json!([]))).unwrap();
        map.notify_request_completed(&id).unwrap();
        assert!(!map.has_pending_requests());
    }

    #[test]
    fn test_route() {
        let mut map = map();
        let todos = map.add("GET", "/todos/*".into(), MatcherOptions::default()).unwrap();
        let users = map.add("*", "**/users/**".into(), MatcherOptions::default()).unwrap();

        assert_eq!(map.route("GET", "https://example.com/todos/1"), Some(todos.as_str()));
        assert_eq!(map.route("DELETE", "https://example.com/api/users/1"), Some(users.as_str()));
        assert_eq!(map.route("GET", "https://example.com/other"), None);
    }
}
