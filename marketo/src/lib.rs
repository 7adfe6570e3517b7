mod auth;
pub mod bulk;
pub mod custom;
mod envelope;
mod error;
pub mod leads;
pub mod query;
pub mod types;

pub use crate::auth::{AuthToken, TokenInfo};
pub use crate::envelope::{Envelope, Page};
pub use crate::error::{Error, ErrorCode, Reason};
pub use crate::query::{FormValues, Query, QueryError, MAX_BATCH_SIZE};

use crate::auth::{Credentials, TokenStore};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP timeout applied to every call, token exchanges included.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Settings for [`MarketoClient::new`].
#[derive(Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Instance root, e.g. `https://123-ABC-456.mktorest.com`
    pub endpoint: String,
    /// Seconds
    pub timeout: u64,
    /// Also log request and response bodies at debug level
    pub debug: bool,
}

impl ClientConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT_SECS,
            debug: false,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Progress of one enveloped request; a request is resent at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Sent,
    Resent,
}

/// Marketo REST client. Share it between tasks behind an `Arc`.
pub struct MarketoClient {
    client: Client,
    endpoint: String,
    tokens: TokenStore,
    debug: bool,
}

impl MarketoClient {
    /// Builds a client and obtains its first access token.
    ///
    /// # Errors
    /// Returns [`Error::Auth`] if the identity endpoint rejects the
    /// credentials, [`Error::Transport`] if it cannot be reached, and
    /// [`Error::Decode`] if its response is malformed.
    pub async fn new(config: ClientConfig) -> Result<Self, Error> {
        let timeout = if config.timeout == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            config.timeout
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let credentials = Credentials {
            client_id: config.client_id,
            client_secret: config.client_secret,
        };
        let tokens = TokenStore::connect(client.clone(), &endpoint, credentials).await?;
        Ok(Self {
            client,
            endpoint,
            tokens,
            debug: config.debug,
        })
    }

    /// The token currently attached to requests and when it expires.
    #[must_use]
    pub fn token_info(&self) -> TokenInfo {
        self.tokens.info()
    }

    /// Forces a new client-credentials exchange.
    ///
    /// # Errors
    /// Returns an error if the exchange fails; the previous token stays in use.
    pub async fn refresh_token(&self) -> Result<AuthToken, Error> {
        self.tokens.refresh().await
    }

    fn url(&self, resource: &str) -> String {
        format!("{}{}", self.endpoint, resource)
    }

    /// Starts a request for `resource` (a path such as `/rest/v1/leads.json`).
    /// The bearer token is added when it is sent.
    #[must_use]
    pub fn request(&self, method: Method, resource: &str) -> RequestBuilder {
        self.client.request(method, self.url(resource))
    }

    async fn dispatch(&self, request: RequestBuilder, token: &str) -> Result<Response, Error> {
        let request = request.bearer_auth(token).build()?;
        debug!(method = %request.method(), url = %request.url(), "sending request");
        if self.debug {
            if let Some(body) = request.body().and_then(reqwest::Body::as_bytes) {
                debug!(body = %String::from_utf8_lossy(body), "request body");
            }
        }
        let response = self.client.execute(request).await?;
        debug!(status = %response.status(), "received response");
        Ok(response)
    }

    /// Raw mode: sends with a fresh token and hands back the response as is.
    ///
    /// # Errors
    /// Returns an error if a needed token refresh fails or no response is
    /// received.
    pub async fn send_raw(&self, request: RequestBuilder) -> Result<Response, Error> {
        let token = self.tokens.fresh_token().await?;
        self.dispatch(request, &token).await
    }

    /// Enveloped mode: sends with a fresh token and decodes the envelope.
    ///
    /// A 601/602 soft error replaces the token and resends the request once;
    /// nothing else is retried.
    ///
    /// # Errors
    /// Returns [`Error::Api`] for `success=false` envelopes and non-200
    /// responses with an envelope body, [`Error::Http`] for other non-200
    /// responses, [`Error::TokenRejected`] if the resend is rejected too.
    pub async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Envelope, Error> {
        let mut token = self.tokens.fresh_token().await?;
        let mut pending = request;
        let mut attempt = Attempt::Sent;
        loop {
            let resend = pending.try_clone();
            let response = self.dispatch(pending, &token).await?;
            let envelope = self.read_envelope(operation, response).await?;
            if !envelope.is_token_rejected() {
                return envelope.into_result();
            }
            match (attempt, resend) {
                (Attempt::Sent, Some(next)) => {
                    warn!(
                        operation,
                        request_id = %envelope.request_id,
                        code = %envelope.errors[0].code,
                        "access token rejected, refreshing and resending"
                    );
                    token = self.tokens.replace_rejected(&token).await?;
                    pending = next;
                    attempt = Attempt::Resent;
                }
                _ => {
                    return Err(Error::TokenRejected {
                        reasons: envelope.errors,
                    })
                }
            }
        }
    }

    async fn read_envelope(&self, operation: &str, response: Response) -> Result<Envelope, Error> {
        let status = response.status();
        let body = response.bytes().await?;
        if self.debug {
            debug!(operation, body = %String::from_utf8_lossy(&body), "response body");
        }
        if status != StatusCode::OK {
            return Err(Error::from_status(operation, status, &body));
        }
        Envelope::decode(&body)
    }

    /// Enveloped GET of `resource`.
    ///
    /// # Errors
    /// See [`MarketoClient::send`].
    pub async fn get(&self, resource: &str) -> Result<Envelope, Error> {
        self.send(resource, self.request(Method::GET, resource)).await
    }

    /// Enveloped POST of a JSON body.
    ///
    /// # Errors
    /// See [`MarketoClient::send`].
    pub async fn post<U>(&self, resource: &str, body: &U) -> Result<Envelope, Error>
    where
        U: serde::ser::Serialize + ?Sized,
    {
        self.send(resource, self.request(Method::POST, resource).json(body))
            .await
    }

    /// Enveloped DELETE with a JSON body.
    ///
    /// # Errors
    /// See [`MarketoClient::send`].
    pub async fn delete<U>(&self, resource: &str, body: &U) -> Result<Envelope, Error>
    where
        U: serde::ser::Serialize + ?Sized,
    {
        self.send(resource, self.request(Method::DELETE, resource).json(body))
            .await
    }

    /// Enveloped read that carries its parameters in a form body, using the
    /// `_method=GET` override so long filter lists do not hit URL limits.
    ///
    /// # Errors
    /// See [`MarketoClient::send`].
    pub async fn post_form(&self, resource: &str, form: &FormValues) -> Result<Envelope, Error> {
        let request = self
            .request(Method::POST, resource)
            .query(&[("_method", "GET")])
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form.encode());
        self.send(resource, request).await
    }
}
