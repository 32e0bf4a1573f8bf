//! Client-steering response returned by the Cookie Server.
//!
//! After authorizing a client, the Cookie Server answers with a small JSON
//! object naming the relay endpoint the client should connect to (or an
//! error message). The JSON is prefixed with an XSSI guard that consumers
//! must strip before decoding.

use serde::{Deserialize, Serialize};

/// The XSSI guard prepended to JSON responses, the literal `)]}'` followed
/// by a newline.
pub const XSSI_PREFIX: &str = ")]}'\n";

/// Errors raised while decoding a [`Redirect`].
#[derive(Debug, thiserror::Error)]
pub enum RedirectError {
    /// The response does not start with [`XSSI_PREFIX`].
    #[error("XSSI prefix not found")]
    MissingXssiPrefix,
    /// The response body after the prefix is not valid JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A redirection response sent to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    /// The relay endpoint to connect to, as `host:port`.
    pub endpoint: String,
    /// An error message; when set, `endpoint` is meaningless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Redirect {
    /// Creates a `Redirect` steering the client to the given endpoint.
    pub fn from_endpoint(endpoint: impl Into<String>) -> Self {
        Redirect {
            endpoint: endpoint.into(),
            error: None,
        }
    }

    /// Creates a `Redirect` carrying an error message.
    pub fn from_error(msg: impl Into<String>) -> Self {
        Redirect {
            endpoint: String::new(),
            error: Some(msg.into()),
        }
    }

    /// Serializes the redirect as JSON with the XSSI guard prepended.
    pub fn to_xssi_json(&self) -> String {
        let json = serde_json::to_string(self).expect("can serialize redirect");
        format!("{XSSI_PREFIX}{json}")
    }

    /// Decodes a redirect from a response body, stripping the XSSI guard.
    pub fn from_xssi_json(b: &[u8]) -> Result<Self, RedirectError> {
        let json = b
            .strip_prefix(XSSI_PREFIX.as_bytes())
            .ok_or(RedirectError::MissingXssiPrefix)?;
        Ok(serde_json::from_slice(json)?)
    }
}
