//! Record/replay store behavior on disk

mod common;

use common::{anthropic_text_events, anthropic_weather_events, collect, init_tracing, weather_request};
use futures::StreamExt;
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use unistream_core::decode::{decode, EventSink};
use unistream_core::protocol::{ChatRequest, Message, ProviderKind, StreamEvent, UnifiedResponse};
use unistream_core::recorder::{
    request_hash, CaptureTap, MatchKind, RecordedExchange, RecorderError, ReplayStore,
    ResponseData,
};

async fn decode_events(
    provider: ProviderKind,
    events: unistream_core::ProviderEventStream,
) -> (UnifiedResponse, Vec<StreamEvent>) {
    let (sink, rx) = EventSink::channel(4, CancellationToken::new());
    let consumer = tokio::spawn(collect(rx));
    let mut adapter = provider.adapter();
    let response = decode(adapter.as_mut(), events, &sink, "claude-sonnet").await.unwrap();
    drop(sink);
    (response, consumer.await.unwrap())
}

#[tokio::test]
async fn test_replay_reproduces_live_decode() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = ReplayStore::new(dir.path(), "weather suite");
    let request = weather_request("claude-sonnet");

    let live = futures::stream::iter(anthropic_weather_events().into_iter().map(Ok)).boxed();
    let (live, tap) = CaptureTap::wrap(live);
    let (live_response, live_events) = decode_events(ProviderKind::Anthropic, live).await;
    let capture = store
        .record(ProviderKind::Anthropic, &request, tap.into_response_data())
        .unwrap();
    assert_eq!(capture.request_hash, request_hash(&request).unwrap());

    let loaded = store.load(ProviderKind::Anthropic, &request).unwrap();
    assert_eq!(loaded.match_kind, MatchKind::Exact);
    assert_eq!(loaded.exchange.chunk_count, anthropic_weather_events().len());

    let adapter = ProviderKind::Anthropic.adapter();
    let replay = loaded.exchange.replay_stream(adapter.as_ref()).unwrap();
    let (replayed_response, replayed_events) = decode_events(ProviderKind::Anthropic, replay).await;

    assert_eq!(replayed_events, live_events);
    assert_eq!(replayed_response, live_response);
}

#[test]
fn test_capture_file_name_and_layout() {
    let dir = TempDir::new().unwrap();
    let store = ReplayStore::new(dir.path(), "weather suite");
    let request = weather_request("claude/sonnet:4");

    let capture = store
        .record(
            ProviderKind::Anthropic,
            &request,
            ResponseData::Stream(anthropic_text_events("hi")),
        )
        .unwrap();

    let name = capture.path.file_name().unwrap().to_string_lossy().into_owned();
    let prefix = format!("weather-suite_claude-sonnet-4_{}_", &capture.request_hash[..8]);
    assert!(name.starts_with(&prefix), "unexpected file name {}", name);
    assert!(name.ends_with(".json"));

    let stored: serde_json::Value =
        serde_json::from_slice(&fs::read(&capture.path).unwrap()).unwrap();
    assert_eq!(stored["provider"], json!("anthropic"));
    assert_eq!(stored["modelId"], json!("claude/sonnet:4"));
    assert_eq!(stored["testLabel"], json!("weather suite"));
    assert_eq!(stored["requestHash"], json!(capture.request_hash));
    assert!(stored["responseData"].is_array());
}

#[test]
fn test_hash_ignores_nothing_that_matters() {
    let base = weather_request("m");
    let same = weather_request("m");
    let warmer = weather_request("m").with_temperature(0.9);
    let other_model = weather_request("n");
    let other_text = ChatRequest::new("m", vec![Message::user("Rome?")]);

    let hash = request_hash(&base).unwrap();
    assert_eq!(hash, request_hash(&same).unwrap());
    assert_eq!(hash.len(), 64);
    assert_ne!(hash, request_hash(&warmer).unwrap());
    assert_ne!(hash, request_hash(&other_model).unwrap());
    assert_ne!(hash, request_hash(&other_text).unwrap());
}

#[test]
fn test_hash_miss_falls_back_to_most_recent() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = ReplayStore::new(dir.path(), "suite");
    let recorded = weather_request("claude-sonnet");
    store
        .record(ProviderKind::Anthropic, &recorded, ResponseData::Stream(anthropic_text_events("old")))
        .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    let newest = store
        .record(
            ProviderKind::Anthropic,
            &recorded.clone().with_max_tokens(10),
            ResponseData::Stream(anthropic_text_events("new")),
        )
        .unwrap();

    let drifted = recorded.clone().with_max_tokens(99);
    let loaded = store.load(ProviderKind::Anthropic, &drifted).unwrap();
    assert_eq!(loaded.match_kind, MatchKind::MostRecent);
    assert_eq!(loaded.path, newest.path);
}

#[test]
fn test_exact_match_only_refuses_fallback() {
    let dir = TempDir::new().unwrap();
    let store = ReplayStore::new(dir.path(), "suite").with_exact_match_only(true);
    let recorded = weather_request("claude-sonnet");
    store
        .record(ProviderKind::Anthropic, &recorded, ResponseData::Stream(anthropic_text_events("x")))
        .unwrap();

    let err = store
        .load(ProviderKind::Anthropic, &recorded.with_max_tokens(5))
        .unwrap_err();
    match err {
        RecorderError::ReplayNotFound { model, label, hash, .. } => {
            assert_eq!(model, "claude-sonnet");
            assert_eq!(label, "suite");
            assert_eq!(hash.len(), 64);
        }
        other => panic!("expected ReplayNotFound, got {:?}", other),
    }
}

#[test]
fn test_missing_directory_and_other_labels_are_not_found() {
    let dir = TempDir::new().unwrap();
    let request = weather_request("claude-sonnet");

    let missing = ReplayStore::new(dir.path().join("nowhere"), "suite");
    assert!(matches!(
        missing.load(ProviderKind::Anthropic, &request),
        Err(RecorderError::ReplayNotFound { .. })
    ));

    ReplayStore::new(dir.path(), "other-suite")
        .record(ProviderKind::Anthropic, &request, ResponseData::Stream(anthropic_text_events("x")))
        .unwrap();
    assert!(matches!(
        ReplayStore::new(dir.path(), "suite").load(ProviderKind::Anthropic, &request),
        Err(RecorderError::ReplayNotFound { .. })
    ));
}

#[test]
fn test_labels_that_sanitize_alike_stay_separate() {
    let dir = TempDir::new().unwrap();
    let request = weather_request("claude-sonnet");
    ReplayStore::new(dir.path(), "weather suite")
        .record(ProviderKind::Anthropic, &request, ResponseData::Stream(anthropic_text_events("x")))
        .unwrap();

    let lookalike = ReplayStore::new(dir.path(), "weather-suite");
    assert!(matches!(
        lookalike.load(ProviderKind::Anthropic, &request),
        Err(RecorderError::ReplayNotFound { .. })
    ));
    assert!(matches!(
        lookalike.load(ProviderKind::Anthropic, &request.clone().with_max_tokens(5)),
        Err(RecorderError::ReplayNotFound { .. })
    ));

    let models_alike = weather_request("claude:sonnet");
    assert!(matches!(
        ReplayStore::new(dir.path(), "weather suite").load(ProviderKind::Anthropic, &models_alike),
        Err(RecorderError::ReplayNotFound { .. })
    ));
}

#[test]
fn test_back_to_back_records_never_overwrite() {
    let dir = TempDir::new().unwrap();
    let store = ReplayStore::new(dir.path(), "suite");
    let request = weather_request("claude-sonnet");

    let paths: Vec<_> = (0..20)
        .map(|i| {
            store
                .record(
                    ProviderKind::Anthropic,
                    &request,
                    ResponseData::Stream(anthropic_text_events(&format!("take {}", i))),
                )
                .unwrap()
                .path
        })
        .collect();

    let mut unique = paths.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 20);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 20);
    for path in &paths {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("suite_claude-sonnet_"), "unexpected file name {}", name);
    }
}

#[test]
fn test_other_provider_captures_are_ignored() {
    let dir = TempDir::new().unwrap();
    let store = ReplayStore::new(dir.path(), "suite");
    let request = weather_request("shared-model");
    store
        .record(ProviderKind::Bedrock, &request, ResponseData::Stream(vec![]))
        .unwrap();

    assert!(store.load(ProviderKind::Anthropic, &request).is_err());
    assert!(store.load(ProviderKind::Bedrock, &request).is_ok());
}

#[test]
fn test_corrupt_capture_is_skipped() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = ReplayStore::new(dir.path(), "suite");
    let request = weather_request("claude-sonnet");
    fs::write(dir.path().join("suite_claude-sonnet_deadbeef_0.json"), b"{not json").unwrap();
    store
        .record(ProviderKind::Anthropic, &request, ResponseData::Stream(anthropic_text_events("ok")))
        .unwrap();

    let loaded = store.load(ProviderKind::Anthropic, &request).unwrap();
    assert_eq!(loaded.match_kind, MatchKind::Exact);
}

#[tokio::test]
async fn test_non_streaming_capture_replays_as_stream() {
    let request = weather_request("claude-sonnet");
    let complete = json!({
        "id": "msg_9",
        "model": "claude-sonnet",
        "content": [
            {"type": "text", "text": "Let me check."},
            {"type": "tool_use", "id": "toolu_9", "name": "get_weather", "input": {"city": "Paris"}}
        ],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 20, "output_tokens": 8}
    });
    let exchange = RecordedExchange::new(
        ProviderKind::Anthropic,
        &request,
        "suite".to_string(),
        ResponseData::Complete(complete),
    )
    .unwrap();

    let adapter = ProviderKind::Anthropic.adapter();
    let events = exchange.replay_stream(adapter.as_ref()).unwrap();
    let (response, emitted) = decode_events(ProviderKind::Anthropic, events).await;

    assert_eq!(response.text, "Let me check.");
    assert_eq!(response.tool_calls[0].arguments, r#"{"city":"Paris"}"#);
    assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
    assert_eq!(response.usage.unwrap().total_tokens, 28);
    assert_eq!(emitted.last(), Some(&StreamEvent::End));
}

#[test]
fn test_unreplayable_complete_response_is_an_error() {
    let request = weather_request("m");
    let exchange = RecordedExchange::new(
        ProviderKind::Bedrock,
        &request,
        "suite".to_string(),
        ResponseData::Complete(json!({"unexpected": true})),
    )
    .unwrap();

    let adapter = ProviderKind::Bedrock.adapter();
    assert!(matches!(
        exchange.replay_stream(adapter.as_ref()),
        Err(RecorderError::Unreplayable(_))
    ));
}
