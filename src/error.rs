use std::sync::Arc;

/// Represents a result type for operations in the Schematic SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// Schematic-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Schematic SDK.
///
/// Flag reads never surface these errors to callers; they degrade to fallback values
/// instead. [`Client::set_context`](crate::Client::set_context) is the one operation whose
/// failures are reported.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Invalid base URL configuration.
    #[error("invalid url configuration")]
    InvalidUrl(#[source] url::ParseError),

    /// The request was unauthorized, possibly due to an invalid API key.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// A newer `set_context` call replaced this one before its snapshot arrived.
    #[error("context request superseded by a newer set_context call")]
    Superseded,

    /// No flag snapshot arrived within the configured `set_context` timeout.
    #[error("timed out waiting for a flag snapshot")]
    Timeout,

    /// The connection went away before a flag snapshot was received.
    #[error("connection closed before a flag snapshot was received")]
    ConnectionClosed,

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// WebSocket transport error.
    #[error(transparent)]
    WebSocket(Arc<tokio_tungstenite::tungstenite::Error>),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Arc::new(value))
    }
}
