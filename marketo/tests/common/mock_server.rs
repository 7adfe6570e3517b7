#![allow(dead_code)]

use marketo::{ClientConfig, MarketoClient};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Match, Mock, MockServer, Request, Respond, ResponseTemplate};

pub const CLIENT_ID: &str = "test_client";
pub const CLIENT_SECRET: &str = "test_secret";
pub const TOKEN: &str = "test_token";

#[derive(Deserialize)]
pub struct Fixture {
    #[serde(rename = "_meta")]
    pub meta: Option<FixtureMeta>,
    pub request: FixtureRequest,
    pub response: FixtureResponse,
}

#[derive(Deserialize)]
pub struct FixtureMeta {
    /// Parameters that must appear in the query string
    pub query: Option<HashMap<String, serde_json::Value>>,
    /// Parameters that must appear in an urlencoded request body
    pub form: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Deserialize)]
pub struct FixtureRequest {
    pub method: String,
    pub path_pattern: String,
}

#[derive(Deserialize)]
pub struct FixtureResponse {
    pub status_code: u16,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Used instead of `body` for non-JSON payloads
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

pub fn token_body(access_token: &str, expires_in: i64) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": expires_in,
        "scope": "api@example.com"
    })
}

pub fn envelope_ok(result: serde_json::Value) -> serde_json::Value {
    json!({
        "requestId": "a1b2#c3d4",
        "success": true,
        "result": result
    })
}

pub fn envelope_err(code: &str, message: &str) -> serde_json::Value {
    json!({
        "requestId": "a1b2#c3d4",
        "success": false,
        "errors": [{ "code": code, "message": message }]
    })
}

pub struct MarketoMock {
    pub server: MockServer,
}

impl MarketoMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    /// Serves the identity endpoint with a fixed token.
    pub async fn mount_token(&self, access_token: &str, expires_in: i64) {
        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(token_body(access_token, expires_in)),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mount_fixture(&self, fixture_path: &str) {
        let full_path = Self::fixtures_dir().join(fixture_path);

        let content = fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e));

        let fixture: Fixture = serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", full_path.display(), e));

        let mut mock = Mock::given(method(fixture.request.method.as_str()))
            .and(path_regex(&fixture.request.path_pattern));

        if let Some(query) = fixture.meta.as_ref().and_then(|meta| meta.query.as_ref()) {
            for (key, value) in query {
                if let Some(value) = query_value_to_string(value) {
                    mock = mock.and(query_param(key.as_str(), value.as_str()));
                }
            }
        }
        if let Some(form) = fixture.meta.as_ref().and_then(|meta| meta.form.as_ref()) {
            for (key, value) in form {
                if let Some(value) = query_value_to_string(value) {
                    mock = mock.and(form_param(key, value));
                }
            }
        }

        let mut template = ResponseTemplate::new(fixture.response.status_code);
        if let Some(body) = &fixture.response.body {
            template = template.set_body_json(body);
        } else if let Some(text) = fixture.response.body_text {
            let content_type = fixture
                .response
                .content_type
                .unwrap_or_else(|| "text/plain".to_string());
            template = template.set_body_raw(text.into_bytes(), &content_type);
        }

        mock.respond_with(template).mount(&self.server).await;
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(CLIENT_ID, CLIENT_SECRET, self.server.uri()).with_debug(true)
    }

    /// Mounts a long-lived token and connects.
    pub async fn client(&self) -> MarketoClient {
        self.mount_token(TOKEN, 3599).await;
        self.connect().await
    }

    /// Connects using whatever identity mock the test mounted.
    pub async fn connect(&self) -> MarketoClient {
        MarketoClient::new(self.config())
            .await
            .expect("client construction failed")
    }
}

fn query_value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(value) => Some(value.clone()),
        serde_json::Value::Number(value) => Some(value.to_string()),
        serde_json::Value::Bool(value) => Some(value.to_string()),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            None
        }
    }
}

/// Matches a parameter carried in an urlencoded body, never in the URL.
pub struct FormParamMatcher {
    key: String,
    expected: String,
}

pub fn form_param(key: impl Into<String>, expected: impl Into<String>) -> FormParamMatcher {
    FormParamMatcher {
        key: key.into(),
        expected: expected.into(),
    }
}

impl Match for FormParamMatcher {
    fn matches(&self, request: &Request) -> bool {
        form_body_value(request, &self.key).is_some_and(|actual| actual == self.expected)
    }
}

fn form_body_value(request: &Request, key: &str) -> Option<String> {
    let body = std::str::from_utf8(&request.body).ok()?;
    url::form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Identity responder issuing `token-0`, `token-1`, ... The first token lives
/// `first_expires_in` seconds, token `n` after it lives `3600 + n` seconds.
pub struct SequencedTokens {
    issued: AtomicUsize,
    first_expires_in: i64,
}

impl SequencedTokens {
    pub fn new(first_expires_in: i64) -> Self {
        Self {
            issued: AtomicUsize::new(0),
            first_expires_in,
        }
    }
}

impl Respond for SequencedTokens {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let expires_in = if n == 0 {
            self.first_expires_in
        } else {
            3600 + n as i64
        };
        ResponseTemplate::new(200).set_body_json(token_body(&format!("token-{n}"), expires_in))
    }
}

/// Mounts an identity endpoint that must be hit exactly `expected` times.
pub async fn mount_sequenced_tokens(server: &MockServer, first_expires_in: i64, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/identity/oauth/token"))
        .respond_with(SequencedTokens::new(first_expires_in))
        .expect(expected)
        .mount(server)
        .await;
}
