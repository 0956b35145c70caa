//! Contact search command.

use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use lc_provider::{ContactProvider, ProviderError};

use crate::cli::SearchArgs;
use crate::config::OutputFormat;
use crate::output::{output_contacts, success};

/// Runs one search, ticking the provider until results arrive.
///
/// The search is cancelled if it has not finished after `wait_ms`.
pub fn run_search(
    args: &SearchArgs,
    provider: &mut dyn ContactProvider,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let (tx, rx) = mpsc::channel();
    let handle = provider.begin_search(
        &args.predicate,
        Box::new(move |contacts: Vec<lc_provider::Contact>| {
            let _ = tx.send(contacts);
        }),
    )?;
    tracing::debug!(handle = %handle, "Search submitted");

    let started = Instant::now();
    let wait = Duration::from_millis(args.wait_ms);
    let tick = Duration::from_millis(args.tick_ms.max(1));

    loop {
        provider.iterate();

        match rx.try_recv() {
            Ok(contacts) => {
                output_contacts(&contacts, format)?;
                if matches!(format, OutputFormat::Table) {
                    success(&format!(
                        "{} contact(s) for '{}' in {} ms",
                        contacts.len(),
                        args.predicate,
                        started.elapsed().as_millis()
                    ));
                }
                return Ok(());
            }
            Err(TryRecvError::Disconnected) => {
                return Err(ProviderError::Internal("search ended without results".into()).into());
            }
            Err(TryRecvError::Empty) => {}
        }

        if started.elapsed() >= wait {
            if let Err(e) = provider.cancel_search(handle) {
                tracing::warn!("Cancel after timeout failed: {}", e);
            }
            return Err(crate::CliError::Timeout {
                predicate: args.predicate.clone(),
                waited_ms: args.wait_ms,
            });
        }

        thread::sleep(tick);
    }
}
