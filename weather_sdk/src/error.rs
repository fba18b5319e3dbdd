//! Error types for the SDK layer.

use std::fmt;

use crate::client::Mode;

/// Errors produced by the SDK layer, wrapping upstream fetch errors and
/// adding input validation and lifecycle failures.
#[derive(Debug)]
pub enum SdkError {
    /// The fetch behind a cache miss failed. Carries the upstream status
    /// code and message unchanged.
    Fetch(openweather_api::Error),
    /// User-provided input failed validation (blank city, blank API key,
    /// unknown mode name).
    InvalidInput(String),
    /// A client already exists for this API key in a different mode.
    ModeConflict { existing: Mode, requested: Mode },
    /// The client has been closed.
    Closed,
}

impl SdkError {
    /// Upstream status code when the provider rejected the request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch(e) => e.status(),
            _ => None,
        }
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "Fetch failed: {}", e),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::ModeConflict {
                existing,
                requested,
            } => write!(
                f,
                "Mode for this API key is already {}; cannot switch to {}",
                existing, requested
            ),
            Self::Closed => write!(f, "Weather client is closed"),
        }
    }
}

impl std::error::Error for SdkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<openweather_api::Error> for SdkError {
    fn from(e: openweather_api::Error) -> Self {
        Self::Fetch(e)
    }
}
