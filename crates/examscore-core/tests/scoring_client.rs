//! Completion client against a mocked model endpoint.

use std::time::Duration;

use chrono::Utc;
use examscore_core::{ApiError, Credential, GraderConfig, ScoringClient, YandexGptClient};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, timeout: Duration) -> YandexGptClient {
    let config = GraderConfig::new("b1gfolder")
        .with_completion_endpoint(&format!("{}/foundationModels/v1/completion", server.uri()))
        .unwrap()
        .with_request_timeout(timeout);
    YandexGptClient::new(&config).unwrap()
}

fn credential() -> Credential {
    Credential::new("iam-token", Utc::now(), Duration::from_secs(3600))
}

fn reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "result": {
            "alternatives": [{"message": {"role": "assistant", "text": text}, "status": "ALTERNATIVE_STATUS_FINAL"}],
            "usage": {"inputTextTokens": "120", "completionTokens": "1", "totalTokens": "121"},
            "modelVersion": "23.10.2024"
        }
    })
}

#[tokio::test]
async fn sends_authorised_request_and_returns_trimmed_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/foundationModels/v1/completion"))
        .and(header("authorization", "Bearer iam-token"))
        .and(header("x-folder-id", "b1gfolder"))
        .and(body_partial_json(serde_json::json!({
            "modelUri": "gpt://b1gfolder/yandexgpt-lite/latest",
            "completionOptions": {"stream": false, "maxTokens": 1000},
            "messages": [{"role": "user", "text": "Оцени ответ"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply(" 2 \n")))
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server, Duration::from_secs(5))
        .complete("Оцени ответ", &credential())
        .await
        .unwrap();
    assert_eq!(text, "2");
}

#[tokio::test]
async fn non_success_status_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(1)
        .mount(&server)
        .await;

    match client(&server, Duration::from_secs(5))
        .complete("p", &credential())
        .await
    {
        Err(ApiError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_reply_path_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": {}})))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .complete("p", &credential())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Malformed { .. }));
}

#[tokio::test]
async fn slow_endpoint_times_out_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("1")).set_delay(Duration::from_secs(5)))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_millis(200))
        .complete("p", &credential())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout(t) if t == Duration::from_millis(200)));
}
