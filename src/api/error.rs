//! Transport-level errors for calls to the tax-office REST API.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    Transport(String),

    #[error("API returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    Decode(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl ApiError {
    /// Network-level failure, as opposed to a non-2xx answer or a bad body.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Transport(_)
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
