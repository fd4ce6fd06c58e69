//! Integration tests for the record-replay cycle

use serde_json::{json, Value};
use tempfile::TempDir;

use playback::config::{Config, Mode};
use playback::exchange::{LiveRequest, LiveResponse};
use playback::fingerprint::RoutePattern;
use playback::playback::{MatcherOptions, MatchingOptions, PlaybackRequestMap, ResponseBody};
use playback::session::{PlaybackSession, SessionOutcome};
use playback::storage::{FileStore, RecordingStore};
use playback::PlaybackError;

const FILE: &str = "cypress/integration/todos.spec.js";
const TITLE: &str = "shows two todos";

fn get(url: &str) -> LiveRequest {
    LiveRequest::new("GET", url, "")
}

fn ok(body: Value) -> LiveResponse {
    LiveResponse::new(200, "OK", Some(body.into()))
}

fn json_body(body: Option<&ResponseBody>) -> Value {
    match body {
        Some(ResponseBody::Json(value)) => value.clone(),
        other => panic!("expected a JSON body, got {other:?}"),
    }
}

fn at_least(count: u32) -> MatcherOptions {
    MatcherOptions {
        to_be_called_at_least: Some(count),
        ..MatcherOptions::default()
    }
}

#[test]
fn test_record_store_reload_replay() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::new(temp_dir.path(), Some("cypress/fixtures".into()));

    // Record
    let id = {
        let mut map = PlaybackRequestMap::new(FILE, TITLE).unwrap();
        let id = map.add("GET", RoutePattern::from("/todos/*"), at_least(2)).unwrap();
        assert!(map.has_pending_requests());

        for todo in 1..=2 {
            let request = get(&format!("https://api.example.com/todos/{todo}"));
            map.notify_request_started(&id).unwrap();
            map.add_response(&id, &request, ok(json!({ "id": todo }))).unwrap();
            map.notify_request_completed(&id).unwrap();
            assert_eq!(map.has_pending_requests(), todo < 2);
        }

        map.seal();
        store.save(FILE, TITLE, &map.serialize()).unwrap();
        id
    };

    let recording = temp_dir
        .path()
        .join("cypress/fixtures/integration/todos-spec/shows-two-todos.playback");
    assert!(recording.exists(), "Recording file should exist");

    // Replay
    let data = store.load(FILE, TITLE).unwrap().unwrap();
    let mut map = PlaybackRequestMap::from_document(FILE, TITLE, data).unwrap();
    let replayed = map.add("GET", RoutePattern::from("/todos/*"), at_least(2)).unwrap();
    assert_eq!(replayed, id);

    let first = map.get_response(&id, &get("https://api.example.com/todos/1"), None).unwrap();
    assert_eq!(json_body(first.body()), json!({ "id": 1 }));
    let second = map.get_response(&id, &get("https://api.example.com/todos/2"), None).unwrap();
    assert_eq!(json_body(second.body()), json!({ "id": 2 }));

    let err = map
        .get_response(&id, &get("https://api.example.com/todos/2"), None)
        .unwrap_err();
    assert!(matches!(err, PlaybackError::ExhaustedReplay { index: 1, .. }));
    assert!(!map.has_pending_requests());
}

#[test]
fn test_replay_follows_recording_order() {
    let mut map = PlaybackRequestMap::new(FILE, TITLE).unwrap();
    let id = map.add("GET", "/todos".into(), at_least(3)).unwrap();
    let request = get("https://api.example.com/todos");
    for version in 1..=3 {
        map.add_response(&id, &request, ok(json!({ "version": version }))).unwrap();
    }

    let data = serde_json::to_value(map.serialize()).unwrap();
    let mut replay = PlaybackRequestMap::from_document(FILE, TITLE, data).unwrap();

    for version in 1..=3 {
        let response = replay.get_response(&id, &request, None).unwrap();
        assert_eq!(json_body(response.body()), json!({ "version": version }));
    }
    assert!(replay.get_response(&id, &request, None).unwrap_err().is_replay_miss());
}

#[test]
fn test_any_once_serves_every_request() {
    let options = MatcherOptions {
        matching: Some(MatchingOptions {
            any_once: Some(true),
            ignores: None,
        }),
        ..MatcherOptions::default()
    };

    let mut map = PlaybackRequestMap::new(FILE, TITLE).unwrap();
    let id = map.add("GET", "**/config/**".into(), options).unwrap();
    map.add_response(&id, &get("https://api.example.com/config/a"), ok(json!({ "flag": true })))
        .unwrap();

    let err = map
        .add_response(&id, &get("https://api.example.com/config/b"), ok(json!({ "flag": false })))
        .unwrap_err();
    assert!(matches!(err, PlaybackError::AnyOnceViolation { .. }));

    let data = serde_json::to_value(map.serialize()).unwrap();
    let mut replay = PlaybackRequestMap::from_document(FILE, TITLE, data).unwrap();
    let response = replay
        .get_response(&id, &get("https://api.example.com/config/zzz?x=1"), None)
        .unwrap();
    assert_eq!(json_body(response.body()), json!({ "flag": true }));
}

#[test]
fn test_binary_bodies_survive_storage() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::new(temp_dir.path(), None);

    let mut map = PlaybackRequestMap::new(FILE, TITLE).unwrap();
    let id = map.add("GET", "/logo.png".into(), MatcherOptions::default()).unwrap();
    let request = get("https://cdn.example.com/logo.png");
    let cheese = vec![0x63, 0x68, 0x65, 0x65, 0x73, 0x65];
    map.add_response(&id, &request, LiveResponse::new(200, "OK", Some(cheese.clone().into())))
        .unwrap();
    store.save(FILE, TITLE, &map.serialize()).unwrap();

    let data = store.load(FILE, TITLE).unwrap().unwrap();
    let stored = &data["matchers"][0]["responseCollections"][0]["responses"][0];
    assert_eq!(stored["bodyType"], "binary");
    assert_eq!(stored["body"], "Y2hlZXNl");

    let mut replay = PlaybackRequestMap::from_document(FILE, TITLE, data).unwrap();
    let response = replay.get_response(&id, &request, None).unwrap();
    match response.body() {
        Some(ResponseBody::Binary(bytes)) => assert_eq!(bytes.as_ref(), cheese.as_slice()),
        other => panic!("expected a binary body, got {other:?}"),
    }
}

#[test]
fn test_seal_prunes_untouched_matchers() {
    let mut recorded = PlaybackRequestMap::new(FILE, TITLE).unwrap();
    let kept = recorded.add("GET", "/todos".into(), MatcherOptions::default()).unwrap();
    recorded.add("GET", "/removed".into(), MatcherOptions::default()).unwrap();

    let data = serde_json::to_value(recorded.serialize()).unwrap();
    let mut map = PlaybackRequestMap::from_document(FILE, TITLE, data).unwrap();
    map.notify_request_started(&kept).unwrap();
    map.seal();

    let document = map.serialize();
    assert_eq!(document.matchers.len(), 1);
    assert_eq!(document.matchers[0].id, kept);

    let err = map.add("GET", "/new".into(), MatcherOptions::default()).unwrap_err();
    assert!(matches!(err, PlaybackError::Sealed { .. }));
}

#[test]
fn test_legacy_document_replays() {
    let legacy = json!({
        "version": 1,
        "matchers": [{
            "id": "legacy-matcher",
            "method": "GET",
            "matcher": "/todos",
            "minTimes": 1,
            "ignoredAttributes": ["body"],
            "responses": [{
                "id": "unused",
                "statusCode": 200,
                "statusMessage": "OK",
                "body": "[]",
                "bodyType": "json",
                "headers": { "content-type": "application/json" }
            }]
        }]
    });

    let map = PlaybackRequestMap::from_document(FILE, TITLE, legacy).unwrap();
    let matcher = &map.matchers()[0];
    assert!(matcher.is_stale());
    assert_eq!(matcher.collections().len(), 1);
    assert_eq!(
        matcher.collections()[0].responses()[0].headers()["content-type"],
        "application/json"
    );
}

#[tokio::test]
async fn test_session_cycle() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::from_toml_str(
        r#"
            fixtures_dir = "fixtures"

            [wait]
            interval_ms = 5
            timeout_ms = 200
        "#,
    )
    .unwrap();
    let store = FileStore::from_config(&config, temp_dir.path());

    // Record
    {
        let session = PlaybackSession::begin(store.clone(), &config, Mode::Record, FILE, TITLE).unwrap();
        session
            .declare("GET", "/todos/*".into(), MatcherOptions::default())
            .await
            .unwrap();

        let request = get("https://api.example.com/todos/1");
        let id = session.route("GET", &request.url).await.unwrap();
        let outbound = session.request_started(&id, &request).await.unwrap();
        assert_eq!(outbound.url, request.url);

        session
            .response_received(&id, &request, ok(json!({ "id": 1 })))
            .await
            .unwrap();
        assert_eq!(
            session.finish(false).await.unwrap(),
            SessionOutcome::Saved { matchers: 1 }
        );
    }

    // Playback
    {
        let session = PlaybackSession::begin(store.clone(), &config, Mode::Playback, FILE, TITLE).unwrap();
        let id = session
            .declare("GET", "/todos/*".into(), MatcherOptions::default())
            .await
            .unwrap();

        let response = session
            .replay(&id, &get("https://api.example.com/todos/1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(json_body(response.body()), json!({ "id": 1 }));

        let err = session
            .replay(&id, &get("https://api.example.com/todos/7"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::ResponseNotFound { .. }));
    }
}
