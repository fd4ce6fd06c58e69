//! Header adjustments applied around recording and replay

use hyper::Uri;

use crate::exchange::{Headers, LiveRequest};
use crate::playback::MatcherOptions;
use crate::Result;

/// Recorded bodies are stored decoded
pub(crate) fn strip_replay_headers(headers: &mut Headers) {
    headers.remove("content-encoding");
}

/// Keep browsers from caching recorded responses, and let them be replayed
/// under any origin
pub(crate) fn adjust_recorded_headers(headers: &mut Headers) {
    headers.insert("cache-control".to_string(), "no-cache".to_string());
    if let Some(allow_origin) = headers.get_mut("access-control-allow-origin") {
        *allow_origin = "*".to_string();
    }
}

/// Request to send over the wire while recording.
///
/// Conditional-request headers are dropped so the server answers with a full
/// body. With `rewrite_origin` the URL and its `host`, `origin` and `referer`
/// headers point at the new origin.
pub(crate) fn outbound_request(request: &LiveRequest, options: &MatcherOptions) -> Result<LiveRequest> {
    let mut outbound = request.clone();
    outbound.headers.remove("if-none-match");

    if options.rewrite_origin.is_some() {
        let url = options.rewrite_url(&request.url)?;
        if let Ok(uri) = url.parse::<Uri>() {
            if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
                outbound.headers.insert("host".to_string(), authority.to_string());
                outbound
                    .headers
                    .insert("origin".to_string(), format!("{scheme}://{authority}"));
            }
        }
        outbound.headers.insert("referer".to_string(), url.clone());
        outbound.url = url;
    }

    Ok(outbound)
}
