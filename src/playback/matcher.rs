//! Test-declared interception rules

use hyper::Uri;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::collection::{PlaybackResponseCollection, SerializedCollection};
use super::response::{PlaybackResponse, SerializedResponse};
use crate::exchange::{LiveRequest, LiveResponse};
use crate::fingerprint::{self, MatchingIgnores, RoutePattern};
use crate::{PlaybackError, Result};

/// Options a test passes when declaring a matcher.
///
/// Unset fields are left out of the JSON form, so the defaults encode as `{}`
/// and do not disturb the matcher id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherOptions {
    /// Minimum number of calls before the matcher is satisfied (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_be_called_at_least: Option<u32>,
    /// Fingerprint tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching: Option<MatchingOptions>,
    /// Record responses outside the 2xx range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_all_status_codes: Option<bool>,
    /// Origin live requests are sent to instead of their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_origin: Option<String>,
}

/// How requests are told apart inside one matcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingOptions {
    /// Record a single response and replay it for every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_once: Option<bool>,
    /// What to leave out of request fingerprints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignores: Option<MatchingIgnores>,
}

impl MatcherOptions {
    /// Minimum call count, 1 when unset
    #[must_use]
    pub fn at_least(&self) -> u32 {
        self.to_be_called_at_least.unwrap_or(1)
    }

    /// Whether `anyOnce` was requested
    #[must_use]
    pub fn any_once(&self) -> bool {
        self.matching.as_ref().and_then(|m| m.any_once).unwrap_or(false)
    }

    /// Declared ignores, empty when unset
    #[must_use]
    pub fn ignores(&self) -> MatchingIgnores {
        self.matching
            .as_ref()
            .and_then(|m| m.ignores.clone())
            .unwrap_or_default()
    }

    /// Whether non-2xx responses are recorded
    #[must_use]
    pub fn allows_all_status_codes(&self) -> bool {
        self.allow_all_status_codes.unwrap_or(false)
    }

    /// URL the transport should actually call for `url`.
    ///
    /// Without `rewrite_origin` this is `url` itself. Fingerprints always use
    /// the original URL.
    ///
    /// # Errors
    ///
    /// Returns error if `url` cannot be parsed or the rewrite origin has no
    /// scheme and host
    pub fn rewrite_url(&self, url: &str) -> Result<String> {
        let Some(origin) = self.rewrite_origin.as_deref() else {
            return Ok(url.to_string());
        };
        let uri = parse_url(url)?;
        let target = parse_url(origin)?;
        let (Some(scheme), Some(authority)) = (target.scheme_str(), target.authority()) else {
            return Err(PlaybackError::InvalidUrl {
                url: origin.to_string(),
                reason: "rewrite origin needs a scheme and a host".to_string(),
            });
        };
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        Ok(format!("{scheme}://{authority}{path}"))
    }
}

/// Stored form of a [`PlaybackRequestMatcher`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedMatcher {
    /// Matcher id
    pub id: String,
    /// HTTP method
    pub method: String,
    /// Canonical pattern text
    pub matcher: String,
    /// Minimum call count
    pub at_least: u32,
    /// Single-response mode
    #[serde(default)]
    pub any_once: bool,
    /// Fingerprint exclusions
    #[serde(default)]
    pub ignores: MatchingIgnores,
    /// Recorded collections, in creation order
    pub response_collections: Vec<SerializedCollection>,
}

/// Every matcher shape found in recording files
#[derive(Deserialize)]
#[serde(untagged)]
enum MatcherRecord {
    Current(SerializedMatcher),
    Legacy(LegacyMatcher),
}

/// Matcher shape with one flat response per fingerprint
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMatcher {
    id: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    matcher: String,
    #[serde(default = "default_at_least", alias = "minTimes")]
    at_least: u32,
    #[serde(default)]
    any_once: bool,
    #[serde(default, alias = "ignoredAttributes")]
    ignores: MatchingIgnores,
    responses: Vec<LegacyResponse>,
}

#[derive(Deserialize)]
struct LegacyResponse {
    id: String,
    #[serde(default)]
    url: String,
    #[serde(flatten)]
    response: SerializedResponse,
}

fn default_at_least() -> u32 {
    1
}

fn parse_url(url: &str) -> Result<Uri> {
    url.parse::<Uri>().map_err(|e| PlaybackError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

impl From<MatcherRecord> for SerializedMatcher {
    fn from(record: MatcherRecord) -> Self {
        match record {
            MatcherRecord::Current(current) => current,
            MatcherRecord::Legacy(legacy) => Self {
                id: legacy.id,
                method: legacy.method,
                matcher: legacy.matcher,
                at_least: legacy.at_least,
                any_once: legacy.any_once,
                ignores: legacy.ignores,
                response_collections: legacy
                    .responses
                    .into_iter()
                    .map(|entry| SerializedCollection {
                        id: entry.id,
                        url: entry.url,
                        responses: vec![entry.response],
                    })
                    .collect(),
            },
        }
    }
}

/// One interception rule declared by a test.
///
/// A matcher restored from disk is stale until a live request reaches it or
/// the test declares it again. Stale matchers are never pending.
#[derive(Debug, Clone)]
pub struct PlaybackRequestMatcher {
    id: String,
    method: String,
    matcher: String,
    route: Option<RoutePattern>,
    options: MatcherOptions,
    at_least: u32,
    any_once: bool,
    ignores: MatchingIgnores,
    collections: Vec<PlaybackResponseCollection>,
    inflight: u32,
    stale: bool,
}

impl PlaybackRequestMatcher {
    /// Declare a matcher
    ///
    /// # Errors
    ///
    /// Returns error if the method is not an HTTP token or `anyOnce` is
    /// combined with a call count other than 1
    pub fn new(method: &str, pattern: RoutePattern, options: MatcherOptions) -> Result<Self> {
        validate_method(method)?;

        let at_least = options.at_least();
        let any_once = options.any_once();
        let ignores = options.ignores();
        if any_once && at_least != 1 {
            return Err(PlaybackError::InvalidMatcher(format!(
                "\"matching.anyOnce\" requires \"toBeCalledAtLeast\" to be 1, got {at_least}"
            )));
        }

        let id = fingerprint::matcher_id(method, &pattern, &options)?;
        let matcher = pattern.as_matcher_string().into_owned();
        if any_once && !ignores.is_empty() {
            warn!(
                matcher = %matcher,
                "\"matching.ignores\" has no effect when \"matching.anyOnce\" is set"
            );
        }

        Ok(Self {
            id,
            method: method.to_string(),
            matcher,
            route: Some(pattern),
            options,
            at_least,
            any_once,
            ignores,
            collections: Vec::new(),
            inflight: 0,
            stale: false,
        })
    }

    /// Restore a stored matcher in either shape; it comes back stale
    ///
    /// # Errors
    ///
    /// Returns error if the record matches no known shape or a response
    /// fails to decode
    pub fn deserialize(record: serde_json::Value) -> Result<Self> {
        let record: MatcherRecord = serde_json::from_value(record)
            .map_err(|e| PlaybackError::CorruptRecord(format!("request matcher: {e}")))?;
        Self::from_serialized(record.into())
    }

    fn from_serialized(record: SerializedMatcher) -> Result<Self> {
        let collections = record
            .response_collections
            .into_iter()
            .map(PlaybackResponseCollection::deserialize)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: record.id,
            method: record.method,
            matcher: record.matcher,
            route: None,
            options: MatcherOptions::default(),
            at_least: record.at_least,
            any_once: record.any_once,
            ignores: record.ignores,
            collections,
            inflight: 0,
            stale: true,
        })
    }

    /// Stored form
    #[must_use]
    pub fn serialize(&self) -> SerializedMatcher {
        SerializedMatcher {
            id: self.id.clone(),
            method: self.method.clone(),
            matcher: self.matcher.clone(),
            at_least: self.at_least,
            any_once: self.any_once,
            ignores: self.ignores.clone(),
            response_collections: self
                .collections
                .iter()
                .map(PlaybackResponseCollection::serialize)
                .collect(),
        }
    }

    /// Take over the declaration of an identical matcher and clear `stale`
    pub(crate) fn revive(&mut self, declared: Self) {
        self.route = declared.route;
        self.options = declared.options;
        self.stale = false;
    }

    /// A live request reached this matcher
    pub fn notify_request_started(&mut self) {
        self.inflight += 1;
        self.stale = false;
    }

    /// A live request of this matcher got its response
    ///
    /// # Errors
    ///
    /// Returns error if no request is in flight
    pub fn notify_request_completed(&mut self) -> Result<()> {
        if self.inflight == 0 {
            return Err(PlaybackError::NoRequestsInflight(self.id.clone()));
        }
        self.inflight -= 1;
        Ok(())
    }

    /// Record a live response under the fingerprint of `request`
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be fingerprinted, the body cannot
    /// be recorded, or `anyOnce` already holds a response
    pub fn add_response(&mut self, request: &LiveRequest, response: LiveResponse) -> Result<()> {
        let fingerprint = fingerprint::request_fingerprint(request, &self.ignores)?;

        if self.any_once && self.collections.iter().any(|c| !c.responses().is_empty()) {
            return Err(PlaybackError::AnyOnceViolation {
                matcher_id: self.id.clone(),
            });
        }

        let response = PlaybackResponse::from_live(response)?;
        let index = match self.collections.iter().position(|c| c.id() == fingerprint) {
            Some(index) => index,
            None => {
                debug!(matcher = %self.id, fingerprint = %fingerprint, url = %request.url, "New response collection");
                self.collections
                    .push(PlaybackResponseCollection::new(fingerprint, request.url.clone()));
                self.collections.len() - 1
            }
        };
        self.collections[index].push(response);
        Ok(())
    }

    /// Collection recorded for `fingerprint`; under `anyOnce` the only
    /// collection answers every fingerprint
    ///
    /// # Errors
    ///
    /// Returns error if nothing was recorded for the fingerprint
    pub fn get_response_collection(
        &mut self,
        fingerprint: &str,
        url: &str,
    ) -> Result<&mut PlaybackResponseCollection> {
        let index = if self.any_once && self.collections.len() == 1 {
            Some(0)
        } else {
            self.collections.iter().position(|c| c.id() == fingerprint)
        };

        match index {
            Some(index) => Ok(&mut self.collections[index]),
            None => Err(PlaybackError::ResponseNotFound {
                matcher_id: self.id.clone(),
                url: url.to_string(),
            }),
        }
    }

    /// Whether the matcher still expects traffic
    #[must_use]
    pub fn is_pending(&self) -> bool {
        if self.stale {
            return false;
        }
        if self.inflight > 0 {
            return true;
        }
        self.total_hits() < u64::from(self.at_least)
    }

    fn total_hits(&self) -> u64 {
        self.collections.iter().map(|c| c.hits() as u64).sum()
    }

    /// Whether a live request is covered by this declaration
    #[must_use]
    pub fn routes(&self, method: &str, url: &str) -> bool {
        let Some(route) = &self.route else {
            return false;
        };
        let method_matches = self.method == "*"
            || self.method.eq_ignore_ascii_case("ANY")
            || self.method.eq_ignore_ascii_case(method);
        method_matches && route.matches(method, url)
    }

    /// Matcher id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Canonical pattern text
    #[must_use]
    pub fn matcher(&self) -> &str {
        &self.matcher
    }

    /// Options from the latest declaration; defaults for a restored matcher
    #[must_use]
    pub fn options(&self) -> &MatcherOptions {
        &self.options
    }

    /// Minimum call count
    #[must_use]
    pub fn at_least(&self) -> u32 {
        self.at_least
    }

    /// Single-response mode
    #[must_use]
    pub fn any_once(&self) -> bool {
        self.any_once
    }

    /// Fingerprint exclusions
    #[must_use]
    pub fn ignores(&self) -> &MatchingIgnores {
        &self.ignores
    }

    /// Recorded collections
    #[must_use]
    pub fn collections(&self) -> &[PlaybackResponseCollection] {
        &self.collections
    }

    /// Requests awaiting a response
    #[must_use]
    pub fn inflight(&self) -> u32 {
        self.inflight
    }

    /// Restored and not yet touched
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// An HTTP method must be a non-empty RFC 9110 token
fn validate_method(method: &str) -> Result<()> {
    let is_tchar = |b: u8| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b);
    if method.is_empty() || !method.bytes().all(is_tchar) {
        return Err(PlaybackError::InvalidArgument(format!(
            "invalid request method '{method}'"
        )));
    }
    Ok(())
}
