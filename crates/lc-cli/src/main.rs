//! # LDAP contact search CLI
//!
//! Looks contacts up in a directory server.

#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use lc_cli::{
    cli::{Cli, Command},
    commands::{open_provider, run_dump, run_search},
    output::error,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut provider = open_provider(&cli.config, cli.domain.as_deref())
        .with_context(|| format!("failed to create provider from {}", cli.config.display()))?;

    match cli.command {
        Command::Search(args) => run_search(&args, &mut provider, cli.output)?,
        Command::Dump => run_dump(&provider, cli.output)?,
    }

    Ok(())
}
