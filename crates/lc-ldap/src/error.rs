//! LDAP-specific error types.
//!
//! ## Security Note
//!
//! Error messages must not leak bind credentials.

use lc_provider::ProviderError;
use thiserror::Error;

use crate::message::MessageId;

/// LDAP-specific errors.
#[derive(Debug, Error)]
pub enum LdapError {
    /// Invalid configuration.
    #[error("LDAP configuration error: {0}")]
    Configuration(String),

    /// Connection failed.
    #[error("LDAP connection failed: {0}")]
    Connection(String),

    /// Search filter is not well formed.
    #[error("Invalid LDAP filter '{filter}': {reason}")]
    InvalidFilter {
        /// The offending filter.
        filter: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The connection handed out a message id that is still pending.
    #[error("Message id {0} is already pending")]
    DuplicateMessageId(MessageId),

    /// No pending request matches.
    #[error("No pending LDAP request with message id {0}")]
    RequestNotFound(MessageId),

    /// Internal error.
    #[error("Internal LDAP error: {0}")]
    Internal(String),
}

impl LdapError {
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

    /// Creates an invalid filter error.
    #[must_use]
    pub fn invalid_filter(filter: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidFilter {
            filter: filter.into(),
            reason,
        }
    }
}

/// Result type for LDAP operations.
pub type LdapResult<T> = Result<T, LdapError>;

impl From<LdapError> for ProviderError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::Configuration(msg) => ProviderError::Configuration(msg),
            LdapError::Connection(msg) => ProviderError::Connection(msg),
            err @ (LdapError::InvalidFilter { .. } | LdapError::DuplicateMessageId(_)) => {
                ProviderError::SearchRejected(err.to_string())
            }
            err @ LdapError::RequestNotFound(_) => ProviderError::SearchNotFound(err.to_string()),
            LdapError::Internal(msg) => ProviderError::Internal(msg),
        }
    }
}
