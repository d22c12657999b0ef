//! Credential provider against a mocked IAM endpoint and probe endpoint.

use std::time::Duration;

use examscore_core::{AuthError, CredentialProvider, CredentialSource, Freshness, GraderConfig};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, source: CredentialSource) -> GraderConfig {
    GraderConfig::new("b1gfolder")
        .with_credential_source(source)
        .with_iam_endpoint(&format!("{}/iam/v1/tokens", server.uri()))
        .unwrap()
        .with_probe_endpoint(&format!("{}/folders/b1gfolder", server.uri()))
        .unwrap()
}

async fn mount_exchange(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/iam/v1/tokens"))
        .and(body_json(serde_json::json!({"yandexPassportOauthToken": "oauth-key"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "iamToken": token,
            "expiresAt": "2030-01-01T00:00:00Z"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_probe(server: &MockServer, token: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path("/folders/b1gfolder"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn exchanges_key_and_reuses_cached_token() {
    let server = MockServer::start().await;
    mount_exchange(&server, "iam-1", 1).await;
    mount_probe(&server, "iam-1", 200).await;

    let provider = CredentialProvider::from_config(&config(
        &server,
        CredentialSource::ApiKey("oauth-key".into()),
    ))
    .unwrap();

    let first = provider.get_credential().await.unwrap();
    assert_eq!(first.freshness, Freshness::Issued);
    assert_eq!(first.credential.token(), "iam-1");

    let second = provider.get_credential().await.unwrap();
    assert_eq!(second.freshness, Freshness::Cached);
    assert_eq!(second.credential.token(), "iam-1");
}

#[tokio::test]
async fn rejected_exchange_without_cache_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iam/v1/tokens"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad oauth token"))
        .mount(&server)
        .await;

    let provider = CredentialProvider::from_config(&config(
        &server,
        CredentialSource::ApiKey("oauth-key".into()),
    ))
    .unwrap();

    match provider.get_credential().await {
        Err(AuthError::Rejected { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad oauth token");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_exchange_response_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iam/v1/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let provider = CredentialProvider::from_config(&config(
        &server,
        CredentialSource::ApiKey("oauth-key".into()),
    ))
    .unwrap();

    assert!(matches!(
        provider.get_credential().await,
        Err(AuthError::InvalidResponse { .. })
    ));
}

#[tokio::test]
async fn issued_token_failing_probe_is_not_returned() {
    let server = MockServer::start().await;
    mount_exchange(&server, "iam-1", 1).await;
    mount_probe(&server, "iam-1", 403).await;

    let provider = CredentialProvider::from_config(&config(
        &server,
        CredentialSource::ApiKey("oauth-key".into()),
    ))
    .unwrap();

    assert!(matches!(
        provider.get_credential().await,
        Err(AuthError::ProbeFailed { .. })
    ));
    assert!(provider.cached().await.is_none());
}

#[tokio::test]
async fn static_token_skips_exchange_but_is_probed() {
    let server = MockServer::start().await;
    mount_exchange(&server, "unused", 0).await;
    mount_probe(&server, "preissued", 200).await;

    let provider = CredentialProvider::from_config(&config(
        &server,
        CredentialSource::StaticToken("preissued".into()),
    ))
    .unwrap();

    let grant = provider.get_credential().await.unwrap();
    assert_eq!(grant.credential.token(), "preissued");
    assert_eq!(grant.freshness, Freshness::Issued);
}

#[tokio::test]
async fn unreachable_issuer_is_a_network_error() {
    let server = MockServer::start().await;
    let config = config(&server, CredentialSource::ApiKey("oauth-key".into()))
        .with_iam_endpoint("http://127.0.0.1:1/iam/v1/tokens")
        .unwrap();
    let provider = CredentialProvider::from_config(&config).unwrap();

    assert!(matches!(
        provider.get_credential().await,
        Err(AuthError::Network { .. })
    ));
}

async fn mount_slow_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/iam/v1/tokens"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"iamToken": "late"}))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn hung_exchange_times_out_without_cache() {
    let server = MockServer::start().await;
    mount_slow_exchange(&server).await;

    let config = config(&server, CredentialSource::ApiKey("oauth-key".into()))
        .with_request_timeout(Duration::from_millis(300));
    let provider = CredentialProvider::from_config(&config).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), provider.get_credential())
        .await
        .expect("credential lookup must be bounded");
    match outcome {
        Err(AuthError::Network { message }) => assert!(message.contains("timed out")),
        other => panic!("expected Network timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn hung_exchange_falls_back_to_stale_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iam/v1/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "iamToken": "iam-1"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_slow_exchange(&server).await;
    mount_probe(&server, "iam-1", 200).await;

    // Zero TTL: every lookup after the first goes back to the issuer.
    let mut config = config(&server, CredentialSource::ApiKey("oauth-key".into()))
        .with_request_timeout(Duration::from_millis(300));
    config.credential_ttl = Duration::ZERO;
    let provider = CredentialProvider::from_config(&config).unwrap();

    let first = provider.get_credential().await.unwrap();
    assert_eq!(first.freshness, Freshness::Issued);

    let second = tokio::time::timeout(Duration::from_secs(10), provider.get_credential())
        .await
        .expect("credential lookup must be bounded")
        .unwrap();
    assert_eq!(second.freshness, Freshness::Degraded);
    assert_eq!(second.credential.token(), "iam-1");
}
