//! Output formatting utilities.

use colored::Colorize;
use lc_provider::Contact;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::config::OutputFormat;

/// Prints a success message.
pub fn success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

/// Contact representation for display.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ContactRow {
    /// Display name.
    pub name: String,
    /// Contact address.
    pub address: String,
}

impl From<&Contact> for ContactRow {
    fn from(contact: &Contact) -> Self {
        Self {
            name: contact.display_name().to_string(),
            address: contact.address.to_string(),
        }
    }
}

/// Outputs contacts in the specified format.
pub fn output_contacts(contacts: &[Contact], format: OutputFormat) -> crate::CliResult<()> {
    let rows: Vec<ContactRow> = contacts.iter().map(ContactRow::from).collect();

    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                info("No contacts found.");
            } else {
                let table = Table::new(&rows).with(Style::rounded()).to_string();
                println!("{table}");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&rows)?;
            println!("{json}");
        }
        OutputFormat::Quiet => {
            for contact in contacts {
                println!("{contact}");
            }
        }
    }
    Ok(())
}
