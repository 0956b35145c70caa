//! # lc-ldap
//!
//! Non-blocking LDAP contact search.
//!
//! This crate resolves free-text predicates into contacts by searching an
//! LDAP directory through `ldap3`. Searches are submitted, then advanced by
//! the host calling [`LdapContactProvider::iterate`]; results arrive
//! through each search's callback.
//!
//! ## Example
//!
//! ```no_run
//! use lc_ldap::LdapContactProvider;
//! use lc_provider::{MemoryConfigStore, SipAddressParser};
//!
//! let store = MemoryConfigStore::new()
//!     .with("directory", "server", "ldap://ldap.example.com")
//!     .with("directory", "base_object", "ou=people,dc=example,dc=com");
//!
//! let mut provider = LdapContactProvider::new(&store, Box::new(SipAddressParser::new()))?;
//! provider.submit("bob", Box::new(|contacts: Vec<lc_provider::Contact>| {
//!     for contact in contacts {
//!         println!("{contact}");
//!     }
//! }))?;
//!
//! loop {
//!     provider.iterate();
//!     if provider.pending_count() == 0 {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! # Ok::<(), lc_ldap::LdapError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod message;
pub mod provider;
pub mod registry;
pub mod search;

pub use config::{AuthMethod, DerefPolicy, DirectoryConfig, DirectoryConfigBuilder, CONFIG_SECTION};
pub use connection::{DirectoryConnection, Ldap3Connection, SearchParams};
pub use error::{LdapError, LdapResult};
pub use mapper::ContactMapper;
pub use message::{DirectoryEntry, MessageBody, MessageId, PollOutcome, ProtocolMessage, ResultStatus};
pub use provider::{BindState, LdapContactProvider, MAX_RUNNING_REQUESTS, PROVIDER_TYPE};
pub use registry::RequestRegistry;
pub use search::SearchRequest;
