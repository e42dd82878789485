//! Workflow error types and their user-facing categories.

use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;
use crate::upload::TransitionError;

/// Client-side validation failures. Nothing is sent to the API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message too long ({len} characters, max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("File is empty: {0}")]
    EmptyFile(String),

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("No field is being edited")]
    NoActiveEdit,

    #[error("Nothing selected")]
    EmptySelection,

    #[error("{0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The three ways a user action can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transport failure: connection refused, timeout, broken stream.
    Network,
    /// The API answered with a non-2xx status or an unreadable body.
    Api,
    /// Rejected client-side before any request was made.
    Validation,
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Api(e) if e.is_network() => ErrorCategory::Network,
            Self::Api(_) => ErrorCategory::Api,
            Self::Input(_) | Self::Transition(_) | Self::NotFound(_) | Self::Io(_) => {
                ErrorCategory::Validation
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let network = WorkflowError::from(ApiError::Timeout(30));
        assert_eq!(network.category(), ErrorCategory::Network);

        let api = WorkflowError::from(ApiError::Status {
            status: 422,
            body: "bad".into(),
        });
        assert_eq!(api.category(), ErrorCategory::Api);

        let decode = WorkflowError::from(ApiError::Decode("eof".into()));
        assert_eq!(decode.category(), ErrorCategory::Api);

        let input = WorkflowError::from(InputError::EmptyMessage);
        assert_eq!(input.category(), ErrorCategory::Validation);
    }

    #[test]
    fn file_too_large_message() {
        let err = InputError::FileTooLarge {
            size_mb: 30.5,
            max_mb: 25,
        };
        assert_eq!(err.to_string(), "File too large: 30.5MB exceeds 25MB limit");
        assert_eq!(
            err,
            InputError::FileTooLarge {
                size_mb: 30.5,
                max_mb: 25
            }
        );
    }
}
