//! Error types for vsync-client
//!
//! This module provides the crate-wide error type. Conversion attempts that reach the
//! remote service never surface as errors: rejections, transport failures and declined
//! fraud warnings are [`ConversionOutcome`](crate::types::ConversionOutcome) values.
//! Errors are reserved for misuse of the workflow ([`CallerError`]), configuration
//! problems, local I/O and the auxiliary billing/profile collaborators.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vsync-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vsync-client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api_base_url")
        key: Option<String>,
    },

    /// Workflow operation attempted in a state that does not allow it
    #[error("invalid workflow call: {0}")]
    Caller(#[from] CallerError),

    /// No authenticated session is available
    #[error("not authenticated")]
    NotAuthenticated,

    /// Unknown target format token
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed URL
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Saved file collides with an existing one
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision (e.g., "file already exists")
        reason: String,
    },

    /// Invalid path encountered while saving a download
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The invalid path that was encountered
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },

    /// Profile store lookup failed
    #[error("profile store error: {0}")]
    ProfileStore(String),

    /// Checkout or billing portal request failed
    #[error("billing error: {0}")]
    Billing(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Misuse of the conversion workflow, rejected before any network activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallerError {
    /// Submission attempted without a pending file
    #[error("no file selected")]
    NoFileSelected,

    /// Submission attempted while another request is in flight
    #[error("a conversion request is already in flight")]
    SubmissionInFlight,

    /// Submission attempted while a fraud warning awaits a decision
    #[error("a security warning is awaiting confirmation")]
    ConfirmationPending,

    /// Confirm or decline called with no paused response
    #[error("no security warning is awaiting confirmation")]
    NoConfirmationPending,

    /// File or format change attempted while controls are locked
    #[error("controls are locked while a conversion is in progress")]
    ControlsLocked,
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Caller(e) => match e {
                CallerError::NoFileSelected => "no_file_selected",
                CallerError::SubmissionInFlight => "submission_in_flight",
                CallerError::ConfirmationPending => "confirmation_pending",
                CallerError::NoConfirmationPending => "no_confirmation_pending",
                CallerError::ControlsLocked => "controls_locked",
            },
            Error::NotAuthenticated => "not_authenticated",
            Error::InvalidFormat(_) => "invalid_format",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::FileCollision { .. } => "file_collision",
            Error::InvalidPath { .. } => "invalid_path",
            Error::ProfileStore(_) => "profile_store_error",
            Error::Billing(_) => "billing_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error is a workflow misuse rather than a runtime failure
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::Caller(_))
    }
}
