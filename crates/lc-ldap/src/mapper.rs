//! Directory entry to contact mapping.
//!
//! Maps the configured name and address attributes of an entry onto a
//! [`Contact`]. An entry that lacks either attribute, or whose address the
//! host's parser rejects, produces nothing.

use lc_provider::{AddressParser, Contact};

use crate::config::DirectoryConfig;
use crate::message::DirectoryEntry;

/// Maps directory entries to contacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMapper {
    name_attribute: String,
    sip_attribute: String,
}

impl ContactMapper {
    /// Creates a mapper for the given attribute keys.
    #[must_use]
    pub fn new(name_attribute: impl Into<String>, sip_attribute: impl Into<String>) -> Self {
        Self {
            name_attribute: name_attribute.into(),
            sip_attribute: sip_attribute.into(),
        }
    }

    /// Creates a mapper from the configured attribute keys.
    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(&config.name_attribute, &config.sip_attribute)
    }

    /// Returns the attribute mapped to the contact name.
    #[must_use]
    pub fn name_attribute(&self) -> &str {
        &self.name_attribute
    }

    /// Returns the attribute mapped to the contact address.
    #[must_use]
    pub fn sip_attribute(&self) -> &str {
        &self.sip_attribute
    }

    /// Maps one entry, or returns `None` if it cannot become a contact.
    #[must_use]
    pub fn map_entry(&self, entry: &DirectoryEntry, parser: &dyn AddressParser) -> Option<Contact> {
        let (name, raw_address) = self.extract(entry)?;

        match parser.parse(&raw_address) {
            Some(address) => {
                tracing::debug!(dn = %entry.dn, name = %name, address = %address, "Mapped contact");
                Some(Contact::new(Some(name), address))
            }
            None => {
                tracing::debug!(dn = %entry.dn, raw = %raw_address, "Dropping entry with unusable address");
                None
            }
        }
    }

    /// Picks the first non-empty value of each mapped attribute.
    ///
    /// An empty value is skipped and the values after it are still
    /// considered. Stops visiting attributes once both fields are set;
    /// later duplicates never overwrite an earlier value.
    fn extract(&self, entry: &DirectoryEntry) -> Option<(String, String)> {
        let mut name: Option<&str> = None;
        let mut address: Option<&str> = None;

        'attributes: for (attr, values) in &entry.attributes {
            let is_name = attr.eq_ignore_ascii_case(&self.name_attribute);
            let is_address = attr.eq_ignore_ascii_case(&self.sip_attribute);
            if !is_name && !is_address {
                continue;
            }

            for value in values.iter().filter(|v| !v.is_empty()) {
                tracing::trace!(attr = %attr, value = %value, "Entry attribute");

                if is_name && name.is_none() {
                    name = Some(value.as_str());
                } else if is_address && address.is_none() {
                    address = Some(value.as_str());
                }

                if name.is_some() && address.is_some() {
                    break 'attributes;
                }
            }
        }

        match (name, address) {
            (Some(name), Some(address)) => Some((name.to_string(), address.to_string())),
            _ => {
                tracing::debug!(dn = %entry.dn, "Entry lacks mapped attributes");
                None
            }
        }
    }
}
