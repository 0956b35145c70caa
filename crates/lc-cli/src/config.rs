//! CLI configuration.

use std::path::Path;

use lc_provider::{SipAddressParser, TomlConfigStore};
use serde::{Deserialize, Serialize};

/// Loads the host configuration store from a TOML file.
pub fn load_store(path: &Path) -> crate::CliResult<TomlConfigStore> {
    if !path.exists() {
        return Err(crate::CliError::Config(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }
    Ok(TomlConfigStore::load(path)?)
}

/// Builds the address parser, with the optional default domain.
#[must_use]
pub fn address_parser(domain: Option<&str>) -> SipAddressParser {
    match domain {
        Some(domain) => SipAddressParser::with_default_domain(domain),
        None => SipAddressParser::new(),
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
    /// Quiet (one contact per line).
    Quiet,
}
