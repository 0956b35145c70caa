//! CLI error types.

use lc_ldap::LdapError;
use lc_provider::ProviderError;
use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider error.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Directory error.
    #[error(transparent)]
    Ldap(#[from] LdapError),

    /// The search did not finish in time.
    #[error("search for '{predicate}' timed out after {waited_ms} ms")]
    Timeout {
        /// Search predicate.
        predicate: String,
        /// Time waited.
        waited_ms: u64,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;
