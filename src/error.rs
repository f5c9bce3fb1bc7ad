//! Error types for RecallAI
//!
//! This module defines the error taxonomy shared by the remote service
//! clients and the session controllers, using `thiserror` for ergonomic
//! error handling.

use thiserror::Error;

/// Main error type for RecallAI operations
///
/// Remote failures are classified into the three kinds the controllers
/// react to (`NotFound`, `Remote`, `Unauthenticated`); the remaining
/// variants cover local configuration and I/O problems.
#[derive(Error, Debug)]
pub enum RecallError {
    /// The target conversation, message, or share token does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure or non-success response from the remote service
    #[error("Remote error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Remote {
        /// HTTP status code, when a response was received at all
        status: Option<u16>,
        /// Response body or transport error description
        message: String,
    },

    /// The session cookie is missing or expired
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// A share token that existed once but is no longer valid
    #[error("Share link expired: {0}")]
    Expired(String),

    /// Caller supplied input the operation cannot act on
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An operation that needs an open conversation was called without one
    #[error("No active conversation")]
    NoActiveConversation,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for RecallAI operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Use
/// [`ErrorKind::classify`] to recover the remote failure kind.
pub type Result<T> = anyhow::Result<T>;

/// Coarse failure classification used at the controller boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target id absent (includes expired share tokens)
    NotFound,
    /// Network failure or non-success response
    Remote,
    /// Session expired; the front end should redirect to the auth flow
    Unauthenticated,
    /// Local failures (config, I/O, invalid input)
    Other,
}

impl ErrorKind {
    /// Classify an error produced anywhere in the crate
    ///
    /// # Examples
    ///
    /// ```
    /// use recallai::error::{ErrorKind, RecallError};
    ///
    /// let err: anyhow::Error = RecallError::NotFound("conversation abc".into()).into();
    /// assert_eq!(ErrorKind::classify(&err), ErrorKind::NotFound);
    /// ```
    pub fn classify(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<RecallError>() {
            Some(RecallError::NotFound(_)) | Some(RecallError::Expired(_)) => Self::NotFound,
            Some(RecallError::Remote { .. }) | Some(RecallError::Http(_)) => Self::Remote,
            Some(RecallError::Unauthenticated(_)) => Self::Unauthenticated,
            Some(_) => Self::Other,
            None => {
                if err.downcast_ref::<reqwest::Error>().is_some() {
                    Self::Remote
                } else {
                    Self::Other
                }
            }
        }
    }
}
