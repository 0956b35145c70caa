//! Command implementations.

pub mod dump;
pub mod search;

pub use dump::run_dump;
pub use search::run_search;

use std::path::Path;

use lc_ldap::LdapContactProvider;

use crate::config::{address_parser, load_store};

/// Loads the configuration file and connects the provider.
pub fn open_provider(config: &Path, domain: Option<&str>) -> crate::CliResult<LdapContactProvider> {
    let store = load_store(config)?;
    let provider = LdapContactProvider::new(&store, Box::new(address_parser(domain)))?;
    Ok(provider)
}
