//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::OutputFormat;

/// LDAP contact search - look up contacts in a directory server.
#[derive(Debug, Parser)]
#[command(name = "lc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML configuration file with a `[directory]` table.
    #[arg(short, long, env = "LC_CONFIG")]
    pub config: PathBuf,

    /// Domain appended to bare user names found in the directory.
    #[arg(short, long, env = "LC_DOMAIN")]
    pub domain: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the directory for contacts.
    Search(SearchArgs),

    /// Connect and print the provider state.
    Dump,
}

/// Arguments of the search command.
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Text substituted into the configured filter. Wildcards are passed
    /// through.
    pub predicate: String,

    /// Give up after this many milliseconds.
    #[arg(long, default_value = "10000")]
    pub wait_ms: u64,

    /// Interval between provider ticks, in milliseconds.
    #[arg(long, default_value = "50")]
    pub tick_ms: u64,
}
