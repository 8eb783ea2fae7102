//! Error types and handling
//!
//! This module provides the error type shared by the conversation controller,
//! engine adapters, and record stores. Every variant maps to a short hint that
//! is safe to show in the chat panel, and reports whether retrying makes sense.
//!
//! Propagation policy: adapter and store failures travel to the caller
//! unchanged. The only failure that is swallowed is an operation completing
//! after its owner was disposed, and that one never becomes an error value.

use thiserror::Error;

/// Result alias used across the SDK and engine library code
pub type Result<T> = std::result::Result<T, ConvoError>;

/// Extra context for errors surfaced to the presentation layer
pub trait ConvoErrorExt {
    /// Returns a short user-facing hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the caller may reasonably re-invoke the operation
    fn is_recoverable(&self) -> bool;
}

/// Main error type
///
/// # Error Categories
///
/// - **Configuration**: missing or invalid template, store, or config file
/// - **Engine**: the conversation engine or completion backend failed
/// - **Network / Timeout**: transport-level completion failures
/// - **Store**: record persistence failures
/// - **Validation / NotFound**: bad input to a service operation
/// - **Disposed**: a command was issued to a disposed controller or engine
///
/// # Examples
///
/// ```
/// use sdk::errors::{ConvoError, ConvoErrorExt};
///
/// let error = ConvoError::Config("template is empty".to_string());
/// assert!(!error.is_recoverable());
///
/// let error = ConvoError::Timeout;
/// assert!(error.is_recoverable());
/// println!("Hint: {}", error.user_hint());
/// ```
#[derive(Debug, Error)]
pub enum ConvoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Conversation engine error: {0}")]
    Engine(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Completion timed out")]
    Timeout,

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conversation has been disposed")]
    Disposed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvoErrorExt for ConvoError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check the conversation template and config.toml",
            Self::Engine(_) => "The assistant could not answer. Try sending the message again",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Timeout => "The assistant took too long to respond. Try again",
            Self::Store(_) => "Saving failed. Your changes were not stored",
            Self::Validation(_) => "Some input was missing or invalid",
            Self::NotFound(_) => "The requested item no longer exists",
            Self::Disposed => "This conversation is closed. Open a new one",
            Self::Serialization(_) => "Stored data could not be read",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Disposed | Self::Serialization(_) => false,
            _ => true,
        }
    }
}
