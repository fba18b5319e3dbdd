//! Error types for the API client.

/// Errors that can occur when requesting current weather.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("Network error while requesting weather: {0}")]
    Network(#[from] reqwest::Error),
    /// The provider reported a non-success code, either as the HTTP status
    /// or as the `cod` field of the response body.
    #[error("OpenWeather API error [{status}]: {message}")]
    HttpStatus { status: u16, message: String },
    /// The response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    ParseFailed(String),
    /// The configured endpoint is not a valid URL.
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
    /// The client was closed and its connection pool released.
    #[error("Client is closed")]
    Closed,
}

impl Error {
    /// Upstream status code, if the provider answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
