//! Error taxonomy shared by every client operation.

use reqwest::StatusCode;
use thiserror::Error;

/// The logical operation an attempt belongs to, used when mapping a
/// transport or HTTP outcome onto the matching [`Error`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Secret,
    Env,
    Proxy,
}

/// Errors surfaced by the Double-O client.
///
/// Each failed call yields exactly one value of this type. The variants carry
/// the HTTP status and underlying transport cause where available, so callers
/// can distinguish configuration mistakes (bad token) from infrastructure
/// issues (timeouts, 5xx) without parsing messages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A secret fetch failed.
    #[error("secret request failed: {message}")]
    Secret {
        message: String,
        status: Option<StatusCode>,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A proxy call failed.
    #[error("proxy request failed: {message}")]
    Proxy {
        message: String,
        status: Option<StatusCode>,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The service rejected the token (HTTP 401/403 from any operation).
    #[error("authentication failed: {message}")]
    Authentication {
        message: String,
        status: Option<StatusCode>,
    },

    /// An environment fetch failed.
    #[error("environment request failed: {message}")]
    Env {
        message: String,
        status: Option<StatusCode>,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The client configuration was rejected at construction time.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl Error {
    /// Builds the operation-specific variant for a failed attempt.
    pub(crate) fn operation(
        op: Operation,
        message: impl Into<String>,
        status: Option<StatusCode>,
        source: Option<reqwest::Error>,
    ) -> Self {
        let message = message.into();
        match op {
            Operation::Secret => Error::Secret {
                message,
                status,
                source,
            },
            Operation::Env => Error::Env {
                message,
                status,
                source,
            },
            Operation::Proxy => Error::Proxy {
                message,
                status,
                source,
            },
        }
    }

    /// The HTTP status attached to this error, if the failure came from a
    /// completed HTTP exchange.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Secret { status, .. }
            | Error::Proxy { status, .. }
            | Error::Authentication { status, .. }
            | Error::Env { status, .. } => *status,
            Error::Config(_) => None,
        }
    }

    /// True when the service rejected the credential itself.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }
}
