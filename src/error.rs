//! Error taxonomy shared by the signer, admin, info, and feed modules.

use thiserror::Error;

/// Result alias used throughout the library modules.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced to the operator. Nothing here is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// No signer is configured, so no request can be authenticated.
    #[error("signer not found: set SECRET_KEY in the env file")]
    SignerNotFound,

    #[error("signer error: {0}")]
    Signer(String),

    /// The relay could not be connected to at all.
    #[error("relay unreachable: {0}")]
    Unreachable(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Non-success HTTP status. The body is deliberately not inspected.
    #[error("HTTP error {status}")]
    Http { status: u16 },

    /// The relay answered with an explicit `error` field.
    #[error("relay error: {0}")]
    Rpc(String),

    #[error("malformed response: {0}")]
    Decode(String),

    /// The relay ended a subscription with `CLOSED`.
    #[error("subscription closed: {0}")]
    Closed(String),

    /// Operator input rejected before any call was attempted.
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e.to_string())
    }
}

/// Classify a `reqwest` failure, separating "could not connect" from the rest.
pub(crate) fn from_request(url: &str, e: reqwest::Error) -> Error {
    if e.is_connect() {
        Error::Unreachable(url.to_string())
    } else {
        Error::Transport(e)
    }
}
