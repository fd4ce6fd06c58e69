//! Route patterns declared by tests

use std::borrow::Cow;
use std::fmt;

use regex::Regex;
use serde_json::Value;

use super::UrlParts;
use crate::{PlaybackError, Result};

/// Flags accepted in a regular expression pattern
const REGEX_FLAGS: &str = "dgimsuy";

/// How a test describes the requests a matcher should intercept
#[derive(Clone)]
pub enum RoutePattern {
    /// Literal URL/path or glob (`*`, `**`, `?`)
    Glob(String),
    /// Regular expression searched in the full URL
    Regex {
        /// Expression source
        source: String,
        /// Flag letters, e.g. `i`
        flags: String,
        /// Compiled expression with inline flags applied
        compiled: Regex,
    },
    /// Structured route description, e.g. `{"pathname": "/todos/*"}`
    Structured(Value),
}

impl RoutePattern {
    /// Build a regular expression pattern
    ///
    /// # Errors
    ///
    /// Returns error if a flag is unknown or repeated, or the source does not
    /// compile
    pub fn regex(source: impl Into<String>, flags: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let flags = flags.into();

        for (i, flag) in flags.char_indices() {
            if !REGEX_FLAGS.contains(flag) || flags[..i].contains(flag) {
                return Err(PlaybackError::InvalidMatcher(format!(
                    "invalid regular expression flags '{flags}'"
                )));
            }
        }

        let inline: String = flags.chars().filter(|f| matches!(f, 'i' | 'm' | 's')).collect();
        let expression = if inline.is_empty() {
            source.clone()
        } else {
            format!("(?{inline}){source}")
        };
        let compiled = Regex::new(&expression)
            .map_err(|e| PlaybackError::InvalidMatcher(format!("/{source}/{flags}: {e}")))?;

        Ok(Self::Regex {
            source,
            flags,
            compiled,
        })
    }

    /// Canonical text used in the matcher id and stored recordings
    pub fn as_matcher_string(&self) -> Cow<'_, str> {
        match self {
            Self::Glob(glob) => Cow::Borrowed(glob),
            Self::Regex { source, flags, .. } => Cow::Owned(format!("/{source}/{flags}")),
            Self::Structured(value) => Cow::Owned(value.to_string()),
        }
    }

    /// Whether a live request is covered by this pattern
    pub fn matches(&self, method: &str, url: &str) -> bool {
        match self {
            Self::Glob(glob) => {
                if glob == url {
                    return true;
                }
                let Ok(parts) = UrlParts::parse(url) else {
                    return glob_matches(glob, url);
                };
                glob == &parts.pathname
                    || glob_matches(glob, url)
                    || glob_matches(glob, &parts.pathname)
            }
            Self::Regex { compiled, .. } => compiled.is_match(url),
            Self::Structured(Value::Object(route)) => {
                let Ok(parts) = UrlParts::parse(url) else {
                    return false;
                };
                route.iter().all(|(key, expected)| {
                    let Some(expected) = expected.as_str() else {
                        return false;
                    };
                    match key.as_str() {
                        "method" => expected.eq_ignore_ascii_case(method),
                        "url" => glob_matches(expected, url),
                        "pathname" => glob_matches(expected, &parts.pathname),
                        "hostname" => glob_matches(expected, &parts.hostname),
                        "path" => {
                            let path = match &parts.query {
                                Some(query) => format!("{}?{query}", parts.pathname),
                                None => parts.pathname.clone(),
                            };
                            glob_matches(expected, &path)
                        }
                        _ => false,
                    }
                })
            }
            Self::Structured(_) => false,
        }
    }
}

impl fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RoutePattern")
            .field(&self.as_matcher_string())
            .finish()
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_matcher_string())
    }
}

impl From<&str> for RoutePattern {
    fn from(glob: &str) -> Self {
        Self::Glob(glob.to_string())
    }
}

impl From<String> for RoutePattern {
    fn from(glob: String) -> Self {
        Self::Glob(glob)
    }
}

impl From<Regex> for RoutePattern {
    fn from(compiled: Regex) -> Self {
        Self::Regex {
            source: compiled.as_str().to_string(),
            flags: String::new(),
            compiled,
        }
    }
}

impl From<Value> for RoutePattern {
    fn from(value: Value) -> Self {
        match value {
            Value::String(glob) => Self::Glob(glob),
            other => Self::Structured(other),
        }
    }
}

/// Translate a glob into an anchored regular expression.
///
/// `**` crosses `/`, `*` does not, `?` is one character.
fn glob_to_regex(glob: &str) -> String {
    let mut expression = String::with_capacity(glob.len() + 8);
    expression.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                expression.push_str(".*");
            }
            '*' => expression.push_str("[^/]*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    expression
}

fn glob_matches(glob: &str, text: &str) -> bool {
    Regex::new(&glob_to_regex(glob)).is_ok_and(|re| re.is_match(text))
}
