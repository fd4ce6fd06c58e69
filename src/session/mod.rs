//! Test lifecycle driver
//!
//! A [`PlaybackSession`] wraps the request map of one running test. The
//! transport calls into it for every intercepted request; at the end of the
//! test [`finish`](PlaybackSession::finish) waits for outstanding traffic and
//! persists what was recorded.

mod headers;

use tokio::sync::Mutex;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{Config, Mode, WaitConfig};
use crate::exchange::{LiveRequest, LiveResponse};
use crate::fingerprint::RoutePattern;
use crate::playback::{MatcherOptions, PlaybackDocument, PlaybackRequestMap, PlaybackResponse};
use crate::storage::RecordingStore;
use crate::{PlaybackError, Result};

/// What [`PlaybackSession::finish`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing was written: the test failed or the mode does not record
    Skipped,
    /// The sealed map was saved
    Saved {
        /// Number of matchers written
        matchers: usize,
    },
}

/// One test's request map plus the store it is loaded from and saved to
pub struct PlaybackSession<S> {
    store: S,
    mode: Mode,
    wait: WaitConfig,
    map: Mutex<PlaybackRequestMap>,
}

impl<S: RecordingStore> PlaybackSession<S> {
    /// Start a test. Modes that play back load the stored recording.
    ///
    /// # Errors
    ///
    /// Returns error if `file` or `title` is empty, or a stored recording
    /// cannot be read
    pub fn begin(store: S, config: &Config, mode: Mode, file: &str, title: &str) -> Result<Self> {
        let stored = if mode.plays_back() {
            store.load(file, title)?
        } else {
            None
        };

        let map = match stored {
            Some(data) => PlaybackRequestMap::from_document(file, title, data)?,
            None => PlaybackRequestMap::new(file, title)?,
        };
        info!(
            file,
            title,
            mode = %mode,
            matchers = map.matchers().len(),
            "Test session started"
        );

        Ok(Self {
            store,
            mode,
            wait: config.wait,
            map: Mutex::new(map),
        })
    }

    /// Resolved mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Declare an interception
    ///
    /// # Errors
    ///
    /// Returns error if the declaration is invalid or the session is finished
    pub async fn declare(&self, method: &str, pattern: RoutePattern, options: MatcherOptions) -> Result<String> {
        self.map.lock().await.add(method, pattern, options)
    }

    /// Matcher covering a live request, if any
    pub async fn route(&self, method: &str, url: &str) -> Option<String> {
        self.map.lock().await.route(method, url).map(str::to_string)
    }

    /// Recorded response to serve instead of the live one.
    ///
    /// `None` means the request must go to the network: the mode does not
    /// play back, or hybrid mode has nothing recorded for it.
    ///
    /// # Errors
    ///
    /// Returns error if the matcher is unknown or, in playback mode, nothing
    /// is left to replay
    pub async fn replay(&self, matcher_id: &str, request: &LiveRequest) -> Result<Option<PlaybackResponse>> {
        if !self.mode.plays_back() {
            return Ok(None);
        }

        let mut map = self.map.lock().await;
        match map.get_response(matcher_id, request, None) {
            Ok(response) => {
                let mut response = response.clone();
                headers::strip_replay_headers(response.headers_mut());
                debug!(matcher = matcher_id, url = %request.url, status = response.status_code(), "Replaying");
                Ok(Some(response))
            }
            Err(e) if self.mode.is_hybrid() && e.is_replay_miss() => {
                debug!(matcher = matcher_id, url = %request.url, "No recording, going live: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// A request is about to go to the network. Returns the request to send.
    ///
    /// # Errors
    ///
    /// Returns error if the matcher is unknown or the rewritten URL is invalid
    pub async fn request_started(&self, matcher_id: &str, request: &LiveRequest) -> Result<LiveRequest> {
        if !self.mode.records() {
            return Ok(request.clone());
        }

        let mut map = self.map.lock().await;
        map.notify_request_started(matcher_id)?;
        let options = map
            .matcher(matcher_id)
            .map(|m| m.options().clone())
            .unwrap_or_default();
        headers::outbound_request(request, &options)
    }

    /// A live response arrived for `request` (the original, not the rewritten
    /// one). Returns the response to deliver.
    ///
    /// # Errors
    ///
    /// Returns error if the matcher is unknown, nothing was in flight, or the
    /// response cannot be recorded
    pub async fn response_received(
        &self,
        matcher_id: &str,
        request: &LiveRequest,
        mut response: LiveResponse,
    ) -> Result<LiveResponse> {
        if !self.mode.records() {
            return Ok(response);
        }

        let mut map = self.map.lock().await;
        map.notify_request_completed(matcher_id)?;
        headers::adjust_recorded_headers(&mut response.headers);

        let allow_all = map
            .matcher(matcher_id)
            .is_some_and(|m| m.options().allows_all_status_codes());
        if response.is_success() || allow_all {
            map.add_response(matcher_id, request, response.clone())?;
        } else {
            warn!(
                method = %request.method,
                url = %request.url,
                status = response.status_code,
                "Response returned a non-2xx status code and was not recorded"
            );
        }

        Ok(response)
    }

    /// Snapshot of the current map
    pub async fn document(&self) -> PlaybackDocument {
        self.map.lock().await.serialize()
    }

    /// End the test.
    ///
    /// Recording modes wait for pending requests, then seal and save the map.
    /// The lock is released between polls so in-flight responses can land.
    ///
    /// # Errors
    ///
    /// Returns error if requests are still pending after the timeout or the
    /// recording cannot be saved
    pub async fn finish(&self, test_failed: bool) -> Result<SessionOutcome> {
        if test_failed || !self.mode.records() {
            debug!(test_failed, mode = %self.mode, "Skipping save");
            return Ok(SessionOutcome::Skipped);
        }

        let deadline = Instant::now() + self.wait.timeout();
        let mut ticker = interval(self.wait.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let map = self.map.lock().await;
            if !map.has_pending_requests() {
                break;
            }
            if Instant::now() >= deadline {
                let pending = map
                    .pending_requests()
                    .map(|m| format!("{} {}", m.method(), m.matcher()))
                    .collect::<Vec<_>>();
                warn!(file = %map.file(), title = %map.title(), ?pending, "Pending requests");
                return Err(PlaybackError::PendingRequests(pending));
            }
        }

        let mut map = self.map.lock().await;
        map.seal();
        let document = map.serialize();
        self.store.save(map.file(), map.title(), &document)?;

        Ok(SessionOutcome::Saved {
            matchers: document.matchers.len(),
        })
    }
}
