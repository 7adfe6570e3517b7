use crate::error::Error;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub(crate) const IDENTITY_PATH: &str = "/identity/oauth/token";

/// Body of a successful client-credentials exchange.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds, counted from when the response was received
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Snapshot of the token currently used for requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub token: String,
    /// Local time at which the token response was received
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub(crate) struct Credentials {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
struct TokenState {
    auth: AuthToken,
    issued_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl TokenState {
    /// Expiry is derived from the local clock at receipt, never from server time.
    fn received(auth: AuthToken, now: OffsetDateTime) -> Self {
        let expires_at = now.saturating_add(Duration::seconds(auth.expires_in));
        Self {
            auth,
            issued_at: now,
            expires_at,
        }
    }

    fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    fn info(&self) -> TokenInfo {
        TokenInfo {
            token: self.auth.access_token.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

/// Holds the one live token of a client.
///
/// `state` is only ever replaced with a complete value, so readers see either
/// the old token with its expiry or the new one with its expiry. `refresh_gate`
/// serializes the network exchanges; it is never held by readers.
pub(crate) struct TokenStore {
    http: Client,
    identity_url: String,
    credentials: Credentials,
    state: RwLock<TokenState>,
    refresh_gate: Mutex<()>,
}

impl TokenStore {
    /// Performs the initial exchange; a store never exists without a token.
    pub(crate) async fn connect(
        http: Client,
        endpoint: &str,
        credentials: Credentials,
    ) -> Result<Self, Error> {
        let identity_url = format!("{endpoint}{IDENTITY_PATH}");
        let auth = request_token(&http, &identity_url, &credentials).await?;
        let state = TokenState::received(auth, OffsetDateTime::now_utc());
        info!(expires_at = %state.expires_at, "obtained access token");
        Ok(Self {
            http,
            identity_url,
            credentials,
            state: RwLock::new(state),
            refresh_gate: Mutex::new(()),
        })
    }

    fn snapshot(&self) -> TokenState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, state: TokenState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub(crate) fn info(&self) -> TokenInfo {
        self.snapshot().info()
    }

    /// Returns a token that was not expired when checked, refreshing first if
    /// the stored one has expired.
    pub(crate) async fn fresh_token(&self) -> Result<String, Error> {
        let current = self.snapshot();
        if !current.is_expired(OffsetDateTime::now_utc()) {
            return Ok(current.auth.access_token);
        }
        debug!(expired_at = %current.expires_at, "access token expired");

        let _gate = self.refresh_gate.lock().await;
        // another caller may have refreshed while we waited
        let current = self.snapshot();
        if !current.is_expired(OffsetDateTime::now_utc()) {
            return Ok(current.auth.access_token);
        }
        Ok(self.exchange().await?.access_token)
    }

    /// Replaces a token the API rejected. If the stored token already differs
    /// from `rejected`, someone else replaced it and no exchange is made.
    pub(crate) async fn replace_rejected(&self, rejected: &str) -> Result<String, Error> {
        let _gate = self.refresh_gate.lock().await;
        let current = self.snapshot();
        if current.auth.access_token != rejected {
            return Ok(current.auth.access_token);
        }
        Ok(self.exchange().await?.access_token)
    }

    /// Unconditional refresh, still serialized with the others.
    pub(crate) async fn refresh(&self) -> Result<AuthToken, Error> {
        let _gate = self.refresh_gate.lock().await;
        self.exchange().await
    }

    /// Must be called with `refresh_gate` held.
    async fn exchange(&self) -> Result<AuthToken, Error> {
        let auth = request_token(&self.http, &self.identity_url, &self.credentials).await?;
        let state = TokenState::received(auth.clone(), OffsetDateTime::now_utc());
        info!(expires_at = %state.expires_at, "refreshed access token");
        self.publish(state);
        Ok(auth)
    }
}

/// The identity endpoint takes the credentials as query parameters.
async fn request_token(
    http: &Client,
    identity_url: &str,
    credentials: &Credentials,
) -> Result<AuthToken, Error> {
    debug!(url = identity_url, client_id = %credentials.client_id, "requesting access token");
    let response = http
        .get(identity_url)
        .query(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await?;

    let status = response.status();
    let body = response.bytes().await?;
    if status != StatusCode::OK {
        return Err(Error::Auth {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    serde_json::from_slice(&body).map_err(Error::from)
}
