//! # lc-cli
//!
//! Command-line host for the LDAP contact provider.
//!
//! This crate provides:
//! - Loading the `[directory]` configuration from a TOML file
//! - Running a search by ticking the provider until results arrive
//! - Dumping the provider state for troubleshooting

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use error::{CliError, CliResult};
