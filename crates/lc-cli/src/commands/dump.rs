//! Provider state dump command.

use lc_ldap::{DirectoryConnection, LdapContactProvider};
use serde_json::json;

use crate::config::OutputFormat;

/// Prints the provider state.
///
/// JSON output carries the configuration without the password.
pub fn run_dump<C: DirectoryConnection>(
    provider: &LdapContactProvider<C>,
    format: OutputFormat,
) -> crate::CliResult<()> {
    match format {
        OutputFormat::Table | OutputFormat::Quiet => print!("{}", provider.describe()),
        OutputFormat::Json => {
            let value = json!({
                "provider": provider.id(),
                "bind_state": provider.bind_state().as_str(),
                "pending_bind": provider.pending_bind().unwrap_or(0),
                "pending_searches": provider.pending_count(),
                "config": provider.config(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}
