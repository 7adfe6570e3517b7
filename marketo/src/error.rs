use crate::envelope::Envelope;
use crate::query::QueryError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(code, message)` pair returned by the API in `errors`, `warning` and
/// record-level `reasons` arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl Reason {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Maps the wire code onto the documented vocabulary, if it is part of it.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(&self.code)
    }

    #[must_use]
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.code()
    }
}

impl From<ErrorCode> for Reason {
    fn from(code: ErrorCode) -> Self {
        Self::new(code.code(), code.message())
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

macro_rules! error_codes {
    ($($variant:ident => ($code:literal, $message:literal),)+) => {
        /// The documented error vocabulary. Codes arrive as strings, both inside
        /// 200-status envelopes and in the bodies of non-200 responses.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorCode {
            $($variant,)+
        }

        impl ErrorCode {
            pub const ALL: &'static [ErrorCode] = &[$(ErrorCode::$variant,)+];

            #[must_use]
            pub const fn code(self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $code,)+
                }
            }

            #[must_use]
            pub const fn message(self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $message,)+
                }
            }

            #[must_use]
            pub fn from_code(code: &str) -> Option<Self> {
                match code.trim() {
                    $($code => Some(ErrorCode::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

error_codes! {
    BadGateway => ("502", "Bad Gateway"),
    EmptyAccessToken => ("600", "Access token not specified"),
    AccessTokenInvalid => ("601", "Access token invalid"),
    AccessTokenExpired => ("602", "Access token expired"),
    AccessDenied => ("603", "Access denied"),
    RequestTimedOut => ("604", "Request time-out"),
    MethodUnsupported => ("605", "HTTP Method not supported"),
    RateLimitExceeded => ("606", "Max rate limit exceeded"),
    DailyQuotaReached => ("607", "Daily quota reached"),
    TemporarilyUnavailable => ("608", "API Temporarily Unavailable"),
    InvalidJson => ("609", "Invalid JSON"),
    NotFound => ("610", "Requested resource not found"),
    SystemError => ("611", "System error"),
    InvalidContentType => ("612", "Invalid Content Type"),
    InvalidMultipart => ("613", "Invalid Multipart Request"),
    InvalidSubscription => ("614", "Invalid Subscription"),
    ConcurrentLimitReached => ("615", "Concurrent access limit reached"),
    InvalidSubscriptionType => ("616", "Invalid subscription type"),
    CannotBeBlank => ("701", "Cannot be blank"),
    NoDataFound => ("702", "No data found for given search scenario"),
    FeatureNotEnabled => ("703", "The feature is not enabled for the subscription"),
    InvalidDateFormat => ("704", "Invalid date format"),
    BusinessRuleViolation => ("709", "Business Rule Violation"),
    ParentFolderNotFound => ("710", "Parent Folder Not Found"),
    IncompatibleFolderType => ("711", "Incompatible Folder Type"),
    MergeOperationInvalid => ("712", "Merge operation invalid"),
    TransientError => ("713", "Transient Error"),
    UnableToFindDefaultRecordType => ("714", "Unable to find the default record type"),
    ExternalSalesPersonIdNotFound => ("718", "ExternalSalesPersonId not found"),
    TooManyImports => ("1016", "Too many imports"),
}

impl ErrorCode {
    /// Codes that mean the bearer token must be replaced before retrying.
    #[must_use]
    pub const fn is_token_error(self) -> bool {
        matches!(self, Self::AccessTokenInvalid | Self::AccessTokenExpired)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No HTTP response was obtained. Never retried.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The identity endpoint refused the client credentials.
    #[error("authentication failed with status {status}: {body}")]
    Auth { status: u16, body: String },
    /// The access token was still rejected after one refresh and resend.
    #[error("access token rejected after refresh: {}", join_reasons(.reasons))]
    TokenRejected { reasons: Vec<Reason> },
    /// Structured failure reported by the API, either inside a 200 envelope
    /// or as the decodable body of a non-200 response.
    #[error("Marketo API error ({status}): {}", join_reasons(.reasons))]
    Api { status: u16, reasons: Vec<Reason> },
    /// Non-200 response whose body is not an envelope.
    #[error("{operation} failed with status {status}: {body}")]
    Http {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to decode CSV response: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid query: {0}")]
    Validation(#[from] QueryError),
}

impl Error {
    /// Classifies a non-200 response. Bodies that decode as an envelope keep
    /// their structured reasons; anything else (gateway pages, empty bodies)
    /// is kept verbatim.
    pub(crate) fn from_status(operation: &str, status: StatusCode, body: &[u8]) -> Self {
        match serde_json::from_slice::<Envelope>(body) {
            Ok(envelope) => Self::Api {
                status: status.as_u16(),
                reasons: envelope.errors,
            },
            Err(_) => Self::Http {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }

    /// Structured reasons carried by this error, empty when none are available.
    #[must_use]
    pub fn reasons(&self) -> &[Reason] {
        match self {
            Self::Api { reasons, .. } | Self::TokenRejected { reasons } => reasons,
            _ => &[],
        }
    }

    #[must_use]
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.reasons().iter().any(|reason| reason.is(code))
    }

    /// HTTP status associated with the failure, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Api { status, .. } | Self::Http { status, .. } => {
                Some(*status)
            }
            Self::TokenRejected { .. } => Some(StatusCode::OK.as_u16()),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::Decode(_) | Self::Csv(_) | Self::Validation(_) => None,
        }
    }
}

fn join_reasons(reasons: &[Reason]) -> String {
    if reasons.is_empty() {
        return "no reasons given".to_string();
    }
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
