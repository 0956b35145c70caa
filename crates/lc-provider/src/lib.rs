//! # lc-provider
//!
//! Contact provider framework.
//!
//! This crate provides the backend-neutral pieces shared by contact
//! providers: contact records, search handles, the provider trait, and the
//! seams to the host's address parser and configuration store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod contact;
pub mod error;
pub mod provider;
pub mod store;

pub use address::{AddressParser, SipAddressParser};
pub use contact::{Contact, ContactAddress, SearchCallback, SearchHandle};
pub use error::{ProviderError, ProviderResult};
pub use provider::ContactProvider;
pub use store::{ConfigStore, MemoryConfigStore, TomlConfigStore};
