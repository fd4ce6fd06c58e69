//! Recording and replay entities
//!
//! Ownership runs strictly top-down: a [`PlaybackRequestMap`] owns its
//! matchers, a matcher owns its response collections and a collection owns
//! its responses. Lookups always go through the map by id.

mod collection;
mod map;
mod matcher;
mod response;

pub use collection::{PlaybackResponseCollection, SerializedCollection};
pub use map::{PlaybackDocument, PlaybackRequestMap};
pub use matcher::{MatcherOptions, MatchingOptions, PlaybackRequestMatcher, SerializedMatcher};
pub use response::{BodyType, PlaybackResponse, ResponseBody, SerializedResponse};

/// Version of the stored document layout
pub const SERIALIZE_VERSION: u32 = 1;
