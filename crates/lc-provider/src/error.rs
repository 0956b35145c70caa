//! Contact provider error types.
//!
//! Errors surfaced to the host are limited to provider construction,
//! search submission and cancellation. Failures that happen while a
//! search is in flight are logged and never reach the caller as errors.

use thiserror::Error;

/// Errors that can occur in contact provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection to the backing directory failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A search could not be started.
    #[error("Search rejected: {0}")]
    SearchRejected(String),

    /// The search handle does not refer to a pending search.
    #[error("Search not found: {0}")]
    SearchNotFound(String),

    /// Internal error.
    #[error("Internal provider error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a search rejected error.
    #[must_use]
    pub fn search_rejected(msg: impl Into<String>) -> Self {
        Self::SearchRejected(msg.into())
    }

    /// Creates a search not found error.
    #[must_use]
    pub fn search_not_found(msg: impl Into<String>) -> Self {
        Self::SearchNotFound(msg.into())
    }

    /// Checks if this is a connection error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Checks if this is a search not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::SearchNotFound(_))
    }
}

/// Result type for contact provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
