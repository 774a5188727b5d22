//! HTTP wrapper contract tests: bearer attachment, 401 handling, error
//! detail extraction, and the store operations that ride on the client.

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mosheng::api::{ApiClient, ApiError, AuthSignal, VoiceCategory};
use mosheng::store::AppStore;

fn profile_body(email: &str) -> serde_json::Value {
    json!({
        "id": "u1",
        "email": email,
        "provider": "local",
        "avatar": null,
        "credits_balance": 420,
        "is_admin": false,
        "created_at": "2025-11-02T10:00:00Z"
    })
}

#[tokio::test]
async fn bearer_token_is_attached_to_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/voices/"))
        .and(header("authorization", "Bearer tok-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "male/ethan.wav",
            "name": "ethan",
            "category": "male",
            "preview_url": "/static/voices/male/ethan.wav",
            "transcript": "Sample line."
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), Some("tok-abc".to_string()));
    let voices = api.voices().await.unwrap();

    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].name, "ethan");
    assert_eq!(voices[0].category, VoiceCategory::Male);
}

#[tokio::test]
async fn unknown_voice_category_falls_back_to_other() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/voices/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "robot/r2.wav",
            "name": "r2",
            "category": "robot",
            "preview_url": "/static/voices/robot/r2.wav"
        }])))
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), None);
    let voices = api.voices().await.unwrap();

    assert_eq!(voices[0].category, VoiceCategory::Other);
    assert_eq!(voices[0].transcript, "");
}

#[tokio::test]
async fn unauthorized_clears_token_and_broadcasts_session_expired() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Could not validate credentials"
        })))
        .mount(&server)
        .await;

    let (api, mut auth_rx) = ApiClient::new(server.uri(), Some("stale".to_string()));
    let err = api.me().await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(err.to_string(), "Could not validate credentials");
    assert!(!api.has_token());
    assert_eq!(auth_rx.try_recv().unwrap(), AuthSignal::SessionExpired);
}

#[tokio::test]
async fn login_posts_form_encoded_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("username=casey%40example.com"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), None);
    let response = api.login("casey@example.com", "hunter2").await.unwrap();

    assert_eq!(response.access_token, "tok-1");
}

#[tokio::test]
async fn backend_detail_is_extracted_from_error_bodies() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "detail": "Email already registered"
        })))
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), None);
    let err = api.register("casey@example.com", "hunter2").await.unwrap_err();

    assert!(matches!(err, ApiError::Backend { .. }));
    assert_eq!(err.to_string(), "Email already registered");
}

#[tokio::test]
async fn error_without_json_body_falls_back_to_status_reason() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/voices/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>boom</html>"))
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), None);
    let err = api.voices().await.unwrap_err();

    assert_eq!(err.to_string(), "Internal Server Error");
}

#[tokio::test]
async fn store_login_populates_user_and_credits() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer tok-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("casey@example.com")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/credits/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "balance": 420,
            "user_id": "u1"
        })))
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), None);
    let mut store = AppStore::new();
    store.login(&api, "tok-9".to_string()).await.unwrap();

    let user = store.user.as_ref().unwrap();
    assert_eq!(user.name, "casey");
    assert_eq!(user.email, "casey@example.com");
    assert_eq!(store.credits, 420);
    assert_eq!(api.token().as_deref(), Some("tok-9"));
}

#[tokio::test]
async fn store_login_failure_drops_token_and_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), None);
    let mut store = AppStore::new();
    let err = store.login(&api, "tok-9".to_string()).await.unwrap_err();

    assert!(matches!(err, ApiError::Backend { .. }));
    assert!(!api.has_token());
    assert!(store.user.is_none());
}

#[tokio::test]
async fn refresh_failure_is_an_implicit_logout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Could not validate credentials"
        })))
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), Some("stale".to_string()));
    let mut store = AppStore::new();
    store.set_credits(77);
    store.refresh_user(&api).await;

    assert!(store.user.is_none());
    assert_eq!(store.credits, 0);
    assert!(!api.has_token());
}

#[tokio::test]
async fn load_voices_failure_leaves_prior_state_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/voices/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), None);
    let mut store = AppStore::new();
    store.voices = vec![mosheng::api::Voice {
        id: "female/aria.wav".to_string(),
        name: "Aria".to_string(),
        category: VoiceCategory::Female,
        preview_url: "/static/voices/female/aria.wav".to_string(),
        transcript: String::new(),
    }];
    store.selected_voice = store.voices.first().cloned();

    store.load_voices(&api).await;

    assert_eq!(store.voices.len(), 1);
    assert_eq!(store.selected_voice.as_ref().unwrap().name, "Aria");
    assert!(!store.loading_voices);
}

#[tokio::test]
async fn load_voices_defaults_selection_to_first_voice() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/voices/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "female/aria.wav",
                "name": "aria",
                "category": "female",
                "preview_url": "/static/voices/female/aria.wav",
                "transcript": ""
            },
            {
                "id": "male/ethan.wav",
                "name": "ethan",
                "category": "male",
                "preview_url": "/static/voices/male/ethan.wav",
                "transcript": ""
            }
        ])))
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), None);
    let mut store = AppStore::new();
    store.load_voices(&api).await;

    assert_eq!(store.voices.len(), 2);
    assert_eq!(store.selected_voice.as_ref().unwrap().name, "aria");
}

#[tokio::test]
async fn feedback_posts_message_with_optional_contact() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/feedback"))
        .and(body_string_contains("\"message\":\"polling feels slow\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _rx) = ApiClient::new(server.uri(), Some("tok".to_string()));
    api.send_feedback("polling feels slow", Some("casey@example.com"))
        .await
        .unwrap();
}

#[test]
fn relative_output_urls_resolve_against_the_base() {
    let (api, _rx) = ApiClient::new("http://localhost:33000", None);
    assert_eq!(
        api.absolute_url("/static/outputs/t-1.wav"),
        "http://localhost:33000/static/outputs/t-1.wav"
    );
    assert_eq!(
        api.absolute_url("https://cdn.example.com/t-1.wav"),
        "https://cdn.example.com/t-1.wav"
    );
}
