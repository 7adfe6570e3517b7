mod common;

use common::mock_server::{
    envelope_err, envelope_ok, mount_sequenced_tokens, MarketoMock, CLIENT_ID, CLIENT_SECRET,
    TOKEN,
};
use marketo::{Error, MarketoClient};
use serde_json::json;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const DESCRIBE2: &str = "/rest/v1/leads/describe2.json";

async fn connect_err(mock: &MarketoMock) -> Error {
    match MarketoClient::new(mock.config()).await {
        Ok(_) => panic!("client construction should have failed"),
        Err(err) => err,
    }
}

async fn mount_describe2(mock: &MarketoMock, expected: u64) {
    Mock::given(method("GET"))
        .and(path(DESCRIBE2))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope_ok(json!([]))))
        .expect(expected)
        .mount(&mock.server)
        .await;
}

#[tokio::test]
async fn test_credentials_sent_as_query_params() {
    let mock = MarketoMock::start().await;
    Mock::given(method("GET"))
        .and(path("/identity/oauth/token"))
        .and(query_param("client_id", CLIENT_ID))
        .and(query_param("client_secret", CLIENT_SECRET))
        .and(query_param("grant_type", "client_credentials"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::mock_server::token_body(TOKEN, 3599)),
        )
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = mock.connect().await;
    assert_eq!(client.token_info().token, TOKEN);
}

#[tokio::test]
async fn test_expiry_is_local_receipt_time_plus_lifetime() {
    let mock = MarketoMock::start().await;
    let before = OffsetDateTime::now_utc();
    let client = mock.client().await;
    let after = OffsetDateTime::now_utc();

    let info = client.token_info();
    assert_eq!(info.expires_at - info.issued_at, Duration::seconds(3599));
    assert!(info.issued_at >= before && info.issued_at <= after);
}

#[tokio::test]
async fn test_construction_fails_on_rejected_credentials() {
    let mock = MarketoMock::start().await;
    Mock::given(method("GET"))
        .and(path("/identity/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized",
            "error_description": "Bad client credentials"
        })))
        .mount(&mock.server)
        .await;

    match connect_err(&mock).await {
        Error::Auth { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Bad client credentials"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_construction_fails_on_malformed_token() {
    let mock = MarketoMock::start().await;
    Mock::given(method("GET"))
        .and(path("/identity/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"access_token\":"))
        .mount(&mock.server)
        .await;

    assert!(matches!(connect_err(&mock).await, Error::Decode(_)));
}

#[tokio::test]
async fn test_bearer_token_attached() {
    let mock = MarketoMock::start().await;
    Mock::given(method("GET"))
        .and(path(DESCRIBE2))
        .and(header("Authorization", "Bearer test_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope_ok(json!([]))))
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = mock.client().await;
    assert!(client.get(DESCRIBE2).await.is_ok());
}

#[tokio::test]
async fn test_fresh_token_is_reused() {
    let mock = MarketoMock::start().await;
    mount_sequenced_tokens(&mock.server, 3599, 1).await;
    mount_describe2(&mock, 3).await;

    let client = mock.connect().await;
    for _ in 0..3 {
        client.get(DESCRIBE2).await.unwrap();
    }
    assert_eq!(client.token_info().token, "token-0");
}

#[tokio::test]
async fn test_expired_token_refreshed_once_before_sending() {
    let mock = MarketoMock::start().await;
    mount_sequenced_tokens(&mock.server, 0, 2).await;
    Mock::given(method("GET"))
        .and(path(DESCRIBE2))
        .and(header("Authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope_ok(json!([]))))
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = mock.connect().await;
    let stale = client.token_info();
    assert_eq!(stale.expires_at, stale.issued_at);

    client.get(DESCRIBE2).await.unwrap();

    let info = client.token_info();
    assert_eq!(info.token, "token-1");
    assert_eq!(info.expires_at - info.issued_at, Duration::seconds(3601));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_refresh() {
    let mock = MarketoMock::start().await;
    mount_sequenced_tokens(&mock.server, 0, 2).await;
    mount_describe2(&mock, 16).await;

    let client = Arc::new(mock.connect().await);
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get(DESCRIBE2).await.map(|_| ()) })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // token and expiry come from the same response
    let info = client.token_info();
    assert_eq!(info.token, "token-1");
    assert_eq!(info.expires_at - info.issued_at, Duration::seconds(3601));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rejections_share_one_refresh() {
    let mock = MarketoMock::start().await;
    mount_sequenced_tokens(&mock.server, 3599, 2).await;
    Mock::given(method("GET"))
        .and(path(DESCRIBE2))
        .and(header("Authorization", "Bearer token-0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope_err("601", "Access token invalid")),
        )
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path(DESCRIBE2))
        .and(header("Authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope_ok(json!([]))))
        .expect(12)
        .mount(&mock.server)
        .await;

    let client = Arc::new(mock.connect().await);
    let handles: Vec<_> = (0..12)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get(DESCRIBE2).await.map(|_| ()) })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(client.token_info().token, "token-1");
}

#[tokio::test]
async fn test_manual_refresh_replaces_token() {
    let mock = MarketoMock::start().await;
    mount_sequenced_tokens(&mock.server, 3599, 2).await;

    let client = mock.connect().await;
    let refreshed = client.refresh_token().await.unwrap();

    assert_eq!(refreshed.access_token, "token-1");
    assert_eq!(refreshed.expires_in, 3601);
    assert_eq!(client.token_info().token, "token-1");
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_token() {
    let mock = MarketoMock::start().await;
    Mock::given(method("GET"))
        .and(path("/identity/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::mock_server::token_body(TOKEN, 3599)),
        )
        .up_to_n_times(1)
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/identity/oauth/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock.server)
        .await;

    let client = mock.connect().await;
    let before = client.token_info();

    match client.refresh_token().await {
        Err(Error::Auth { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(client.token_info(), before);
}
