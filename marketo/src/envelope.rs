use crate::error::{Error, ErrorCode, Reason};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// The wrapper present on every REST response.
///
/// `result` is kept undecoded so that each resource call can decode it into
/// its own shape with [`Envelope::result`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub success: bool,
    #[serde(
        rename = "nextPageToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_page_token: Option<String>,
    #[serde(rename = "moreResult", default, skip_serializing_if = "Option::is_none")]
    pub more_result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Reason>,
    #[serde(rename = "warning", default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Reason>,
}

impl Envelope {
    /// Decodes a response body.
    ///
    /// # Errors
    /// Returns [`Error::Decode`] if the body is not a well-formed envelope.
    pub fn decode(body: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(body).map_err(Error::from)
    }

    /// Passes successful envelopes through and turns `success=false` into
    /// [`Error::Api`] carrying every reason in order.
    ///
    /// # Errors
    /// Returns [`Error::Api`] with status 200 when `success` is false.
    pub fn into_result(self) -> Result<Self, Error> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::Api {
                status: 200,
                reasons: self.errors,
            })
        }
    }

    /// Decodes the opaque `result` payload. An absent payload decodes as JSON
    /// `null`, so `Option<T>` targets see `None`.
    ///
    /// # Errors
    /// Returns [`Error::Api`] if the envelope reports failure; the payload is
    /// never looked at in that case. Returns [`Error::Decode`] if the payload
    /// does not match `T`.
    pub fn result<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.success {
            return Err(Error::Api {
                status: 200,
                reasons: self.errors.clone(),
            });
        }
        let raw = self.result.as_deref().map_or("null", RawValue::get);
        serde_json::from_str(raw).map_err(Error::from)
    }

    /// True when the call failed because the bearer token was invalid or
    /// expired, which is the only failure worth a refresh and resend.
    #[must_use]
    pub fn is_token_rejected(&self) -> bool {
        !self.success
            && self
                .errors
                .first()
                .and_then(Reason::error_code)
                .is_some_and(ErrorCode::is_token_error)
    }

    #[must_use]
    pub fn more_result(&self) -> bool {
        self.more_result.unwrap_or(false)
    }
}

/// One page of a list or filter call.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Echo this on the next request to continue; `None` on the last page.
    pub next_page_token: Option<String>,
    pub more_result: bool,
}

impl<T: DeserializeOwned> Page<T> {
    pub(crate) fn from_envelope(envelope: &Envelope) -> Result<Self, Error> {
        let items: Option<Vec<T>> = envelope.result()?;
        Ok(Self {
            items: items.unwrap_or_default(),
            next_page_token: envelope.next_page_token.clone(),
            more_result: envelope.more_result(),
        })
    }
}
