use std::sync::Arc;

use thiserror::Error;

/// Result type used throughout the SDK.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Molasses SDK.
///
/// Only [`Client::init`][crate::Client::init] returns errors to the caller. Errors raised by the
/// background poller and event dispatcher are passed to the
/// [`DiagnosticHook`][crate::DiagnosticHook] and logged.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// API key was empty.
    #[error("api_key is required")]
    MissingApiKey,

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The server rejected the API key.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// Network error or non-success response.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// The server responded with a payload that is not a valid feature catalog.
    #[error("error parsing feature catalog")]
    ConfigurationParseError(#[source] Arc<serde_json::Error>),

    /// An I/O error, e.g. a background thread could not be spawned.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// A background thread panicked. This should normally never happen.
    #[error("background thread panicked")]
    BackgroundThreadPanicked,

    /// The client was stopped before the operation could complete.
    #[error("client is stopped")]
    Stopped,

    /// A background thread did not exit within the shutdown timeout.
    #[error("background thread did not stop in time")]
    ShutdownTimedOut,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::ConfigurationParseError(Arc::new(value))
    }
}
