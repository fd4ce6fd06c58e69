//! Matcher identities and request fingerprints
//!
//! Two independent digests live here:
//!
//! - the matcher id, derived from what the test declared (method, route
//!   pattern, options), so re-declaring the same interception reuses state;
//! - the request fingerprint, derived from one concrete request, which picks
//!   the response collection a recorded response belongs to.
//!
//! Both hash a `::`-joined tuple of strings. Changing which values feed either
//! digest invalidates stored recordings and must come with a bump of
//! [`SERIALIZE_VERSION`](crate::playback::SERIALIZE_VERSION).

mod body;
mod pattern;

use std::borrow::Cow;
use std::fmt;

use hyper::Uri;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::exchange::LiveRequest;
use crate::{PlaybackError, Result};

pub use body::canonicalize_body;
pub use pattern::RoutePattern;

/// Separator between hashed elements
pub const ELEMENT_SEPARATOR: &str = "::";

/// Number of digest bytes kept in an id
const ID_BYTES: usize = 16;

/// Request attributes that feed a fingerprint, in hashing order.
///
/// Reordering this list changes every fingerprint.
pub const ATTRIBUTE_ORDER: [RequestAttribute; 7] = [
    RequestAttribute::Protocol,
    RequestAttribute::Hostname,
    RequestAttribute::Port,
    RequestAttribute::Pathname,
    RequestAttribute::Search,
    RequestAttribute::Method,
    RequestAttribute::Body,
];

/// One attribute of a request that can be excluded from its fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAttribute {
    /// URL scheme, e.g. `https:`
    Protocol,
    /// URL host name
    Hostname,
    /// Explicit, non-default port
    Port,
    /// URL path
    Pathname,
    /// Query string
    Search,
    /// HTTP method
    Method,
    /// Request body
    Body,
}

impl RequestAttribute {
    /// Wire name of the attribute
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Hostname => "hostname",
            Self::Port => "port",
            Self::Pathname => "pathname",
            Self::Search => "search",
            Self::Method => "method",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for RequestAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to leave out of a request fingerprint.
///
/// Accepts either a plain attribute list or the detailed form:
///
/// ```json
/// ["search"]
/// { "attributes": ["port"], "bodyProperties": ["meta.sentAt"], "searchParams": ["_"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchingIgnores {
    /// Attributes only
    Attributes(Vec<RequestAttribute>),
    /// Attributes plus body properties and search params
    Detailed(IgnoreRules),
}

/// Detailed ignore rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreRules {
    /// Attributes skipped entirely
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<RequestAttribute>,
    /// Body property paths removed before hashing, e.g. `items.0.nonce`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_properties: Vec<String>,
    /// Query parameter names removed before hashing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_params: Vec<String>,
}

impl Default for MatchingIgnores {
    fn default() -> Self {
        Self::Attributes(Vec::new())
    }
}

impl From<Vec<RequestAttribute>> for MatchingIgnores {
    fn from(attributes: Vec<RequestAttribute>) -> Self {
        Self::Attributes(attributes)
    }
}

impl From<IgnoreRules> for MatchingIgnores {
    fn from(rules: IgnoreRules) -> Self {
        Self::Detailed(rules)
    }
}

impl MatchingIgnores {
    /// Attributes excluded from the fingerprint
    #[must_use]
    pub fn attributes(&self) -> &[RequestAttribute] {
        match self {
            Self::Attributes(attributes) => attributes,
            Self::Detailed(rules) => &rules.attributes,
        }
    }

    /// Body property paths excluded from the fingerprint
    #[must_use]
    pub fn body_properties(&self) -> &[String] {
        match self {
            Self::Attributes(_) => &[],
            Self::Detailed(rules) => &rules.body_properties,
        }
    }

    /// Query parameter names excluded from the fingerprint
    #[must_use]
    pub fn search_params(&self) -> &[String] {
        match self {
            Self::Attributes(_) => &[],
            Self::Detailed(rules) => &rules.search_params,
        }
    }

    /// True when nothing is ignored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes().is_empty()
            && self.body_properties().is_empty()
            && self.search_params().is_empty()
    }

    fn ignores(&self, attribute: RequestAttribute) -> bool {
        self.attributes().contains(&attribute)
    }
}

/// Hash `::`-joined elements into a 32 character hex id
pub fn digest<I, S>(elements: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for (i, element) in elements.into_iter().enumerate() {
        if i > 0 {
            hasher.update(ELEMENT_SEPARATOR.as_bytes());
        }
        hasher.update(element.as_ref().as_bytes());
    }
    let hash = hasher.finalize();
    hex::encode(&hash[..ID_BYTES])
}

/// Compute the identity of a matcher declaration
///
/// # Errors
///
/// Returns error if the options cannot be JSON encoded
pub fn matcher_id<O: Serialize>(method: &str, pattern: &RoutePattern, options: &O) -> Result<String> {
    let options = serde_json::to_string(options)
        .map_err(|e| PlaybackError::InvalidArgument(format!("matcher options: {e}")))?;
    let pattern = pattern.as_matcher_string();
    Ok(digest([method, &*pattern, options.as_str()]))
}

/// Compute the fingerprint of a concrete request
///
/// # Errors
///
/// Returns error if the URL cannot be parsed or, unless ignored, the body is
/// missing
pub fn request_fingerprint(request: &LiveRequest, ignores: &MatchingIgnores) -> Result<String> {
    let url = UrlParts::parse(&request.url)?;
    let mut elements: Vec<Cow<'_, str>> = Vec::with_capacity(ATTRIBUTE_ORDER.len());

    for attribute in ATTRIBUTE_ORDER {
        if ignores.ignores(attribute) {
            continue;
        }
        let element = match attribute {
            RequestAttribute::Protocol => Cow::Owned(url.protocol()),
            RequestAttribute::Hostname => Cow::Owned(url.hostname.clone()),
            RequestAttribute::Port => match url.port {
                Some(port) => Cow::Owned(port.to_string()),
                None => continue,
            },
            RequestAttribute::Pathname => Cow::Owned(url.pathname.clone()),
            RequestAttribute::Search => {
                let query = url
                    .query
                    .as_deref()
                    .map(|query| filter_search(query, ignores.search_params()))
                    .unwrap_or_default();
                if query.is_empty() {
                    continue;
                }
                Cow::Owned(format!("?{query}"))
            }
            RequestAttribute::Method => Cow::Borrowed(request.method.as_str()),
            RequestAttribute::Body => match request.body.as_ref() {
                None | Some(Value::Null) => {
                    return Err(PlaybackError::MissingRequestBody {
                        url: request.url.clone(),
                    })
                }
                Some(Value::String(text)) => Cow::Borrowed(text.as_str()),
                Some(body) => Cow::Owned(canonicalize_body(body, ignores.body_properties())),
            },
        };
        if !element.is_empty() {
            elements.push(element);
        }
    }

    Ok(digest(&elements))
}

/// The attributes of an absolute URL that take part in fingerprinting
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UrlParts {
    pub scheme: String,
    pub hostname: String,
    pub port: Option<u16>,
    pub pathname: String,
    pub query: Option<String>,
}

impl UrlParts {
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: &str| PlaybackError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri = url.parse::<Uri>().map_err(|e| invalid(&e.to_string()))?;
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| invalid("missing scheme"))?
            .to_ascii_lowercase();
        let hostname = uri
            .host()
            .ok_or_else(|| invalid("missing host"))?
            .to_ascii_lowercase();
        let port = uri
            .port_u16()
            .filter(|port| default_port(&scheme) != Some(*port));
        let pathname = match uri.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };

        Ok(Self {
            scheme,
            hostname,
            port,
            pathname,
            query: uri.query().map(str::to_string),
        })
    }

    pub fn protocol(&self) -> String {
        format!("{}:", self.scheme)
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    }
}

/// Drop ignored parameters from a raw query string, keeping the rest verbatim
fn filter_search(query: &str, ignored: &[String]) -> String {
    if ignored.is_empty() {
        return query.to_string();
    }

    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            let name = segment.split('=').next().unwrap_or_default();
            let name = decode_component(name);
            !ignored.iter().any(|ignored| *ignored == name)
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
