//! Generation workflow tests against a mock backend.
//!
//! These drive the real `ApiClient` + submit-then-poll loop against a
//! wiremock server and verify the terminal-status behavior: exactly one
//! assistant message on completion, one balance refresh, no polls after a
//! terminal status, and the credit guard firing before submission.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mosheng::api::{ApiClient, Voice, VoiceCategory};
use mosheng::generation::{self, GenerationError};
use mosheng::store::{AppStore, Message, Role};

// Fast polling for tests; production uses generation::POLL_INTERVAL.
const POLL: Duration = Duration::from_millis(10);

fn test_voice() -> Voice {
    Voice {
        id: "female/aria.wav".to_string(),
        name: "Aria".to_string(),
        category: VoiceCategory::Female,
        preview_url: "/static/voices/female/aria.wav".to_string(),
        transcript: String::new(),
    }
}

fn test_client(server: &MockServer) -> ApiClient {
    let (api, _rx) = ApiClient::new(server.uri(), Some("tok".to_string()));
    api
}

fn balance_mock(balance: i64) -> Mock {
    Mock::given(method("GET"))
        .and(path("/credits/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "balance": balance,
            "user_id": "u1"
        })))
}

fn status_body(status: &str, output_url: Option<&str>, error: Option<&str>) -> serde_json::Value {
    json!({
        "task_id": "t-1",
        "status": status,
        "output_url": output_url,
        "error": error
    })
}

#[tokio::test]
async fn completed_generation_appends_one_assistant_message_and_stops_polling() {
    let server = MockServer::start().await;

    // One fresh pre-submit check, one refresh after completion.
    balance_mock(1000).expect(2).mount(&server).await;

    Mock::given(method("POST"))
        .and(path("/tts/generate"))
        .and(body_partial_json(json!({
            "text": "hello world",
            "voice_id": "female/aria.wav"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t-1",
            "status": "queued",
            "cost": 11
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Two non-terminal polls, then completed.
    Mock::given(method("GET"))
        .and(path("/tts/status/t-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_body("processing", None, None)),
        )
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tts/status/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(
            "completed",
            Some("/static/outputs/t-1.wav"),
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_client(&server);
    let voice = test_voice();

    let mut store = AppStore::new();
    let conversation_id = store.create_conversation();
    store.append_message(&conversation_id, Message::user("hello world"));

    let outcome = generation::run(&api, "hello world", &voice, POLL)
        .await
        .unwrap();
    assert_eq!(outcome.audio_url, "/static/outputs/t-1.wav");
    assert_eq!(outcome.voice_name, "Aria");
    assert_eq!(outcome.balance, Some(1000));

    // The event loop folds the outcome into the store.
    store.append_message(
        &conversation_id,
        Message::assistant(outcome.audio_url, outcome.voice_name),
    );
    if let Some(balance) = outcome.balance {
        store.set_credits(balance);
    }

    let messages = &store.current_conversation().unwrap().messages;
    assert_eq!(
        messages.iter().filter(|m| m.role == Role::Assistant).count(),
        1
    );
    assert_eq!(store.credits, 1000);

    // Exactly three status polls happened, none after the terminal one.
    let status_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/tts/status/"))
        .count();
    assert_eq!(status_calls, 3);
}

#[tokio::test]
async fn failed_generation_surfaces_backend_error_and_skips_balance_refresh() {
    let server = MockServer::start().await;

    // Only the pre-submit check; failure never refreshes the balance.
    balance_mock(500).expect(1).mount(&server).await;

    Mock::given(method("POST"))
        .and(path("/tts/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t-1",
            "status": "queued",
            "cost": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tts/status/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(
            "failed",
            None,
            Some("voice file corrupted"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_client(&server);
    let err = generation::run(&api, "hello", &test_voice(), POLL)
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::Failed("voice file corrupted".into()));
}

#[tokio::test]
async fn failed_status_without_error_string_uses_fallback() {
    let server = MockServer::start().await;

    balance_mock(500).expect(1).mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/tts/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t-1",
            "status": "queued",
            "cost": 5
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tts/status/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("failed", None, None)))
        .mount(&server)
        .await;

    let api = test_client(&server);
    let err = generation::run(&api, "hello", &test_voice(), POLL)
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::Failed("Generation failed".into()));
}

#[tokio::test]
async fn fresh_balance_shortfall_aborts_before_submitting() {
    let server = MockServer::start().await;

    balance_mock(5).expect(1).mount(&server).await;

    // The generate endpoint must never be hit.
    Mock::given(method("POST"))
        .and(path("/tts/generate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let api = test_client(&server);
    let err = generation::run(&api, "0123456789", &test_voice(), POLL)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GenerationError::InsufficientCredits {
            required: 10,
            available: 5
        }
    );
    // The user-facing message carries both amounts.
    let message = err.to_string();
    assert!(message.contains("10"), "missing required amount: {message}");
    assert!(message.contains("5"), "missing available amount: {message}");
}

#[test]
fn cost_counts_trimmed_characters() {
    assert_eq!(generation::cost_of("  hello  "), 5);
    assert_eq!(generation::cost_of("héllo"), 5);
    assert_eq!(generation::cost_of("   "), 0);
}

#[tokio::test]
async fn backend_payment_rejection_maps_to_shortfall_error() {
    let server = MockServer::start().await;

    balance_mock(100).expect(1).mount(&server).await;

    Mock::given(method("POST"))
        .and(path("/tts/generate"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "detail": "Insufficient credits. Required: 5"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_client(&server);
    let err = generation::run(&api, "hello", &test_voice(), POLL)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GenerationError::InsufficientCredits {
            required: 5,
            available: 100
        }
    );
}

#[tokio::test]
async fn transient_poll_failure_retries_on_next_tick() {
    let server = MockServer::start().await;

    balance_mock(500).expect(2).mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/tts/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t-1",
            "status": "queued",
            "cost": 5
        })))
        .mount(&server)
        .await;

    // First poll blows up; the loop must shrug and try again.
    Mock::given(method("GET"))
        .and(path("/tts/status/t-1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tts/status/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(
            "completed",
            Some("/static/outputs/t-1.wav"),
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_client(&server);
    let outcome = generation::run(&api, "hello", &test_voice(), POLL)
        .await
        .unwrap();

    assert_eq!(outcome.audio_url, "/static/outputs/t-1.wav");
}

#[tokio::test]
async fn unauthenticated_submission_is_rejected_up_front() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/credits/balance"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Could not validate credentials"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = test_client(&server);
    let err = generation::run(&api, "hello", &test_voice(), POLL)
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::Unauthorized);
}
