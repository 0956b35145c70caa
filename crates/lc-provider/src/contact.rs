//! Contact records and search handles.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// A reachable address produced by an [`AddressParser`](crate::AddressParser).
///
/// Always holds a parsed URI (`sip:`, `sips:` or `tel:`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactAddress(Url);

impl ContactAddress {
    /// Wraps an already parsed URI.
    #[must_use]
    pub const fn new(uri: Url) -> Self {
        Self(uri)
    }

    /// Returns the address as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the URI scheme (`sip`, `sips` or `tel`).
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Returns the underlying URI.
    #[must_use]
    pub const fn uri(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for ContactAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact found by a search: display name plus reachable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Display name, if the directory supplied one.
    pub name: Option<String>,

    /// Reachable address.
    pub address: ContactAddress,
}

impl Contact {
    /// Creates a new contact.
    #[must_use]
    pub fn new(name: Option<String>, address: ContactAddress) -> Self {
        Self { name, address }
    }

    /// Returns the display name, falling back to the address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.address.as_str())
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => write!(f, "<{}>", self.address),
        }
    }
}

/// Delivery callback for a completed search.
///
/// Invoked at most once, with ownership of every contact the search
/// accumulated. Any caller context is captured by the closure.
pub type SearchCallback = Box<dyn FnOnce(Vec<Contact>) + Send>;

/// Caller-side handle to a pending search.
///
/// Identifies the search by both the protocol message id and a token that
/// is unique to the request, so a handle for a finished search never
/// matches a newer search that happens to reuse the same message id.
/// Handles are not `Clone`: cancelling consumes the handle.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SearchHandle {
    msgid: i32,
    token: Uuid,
}

impl SearchHandle {
    /// Creates a handle. Called by providers when a search is registered.
    #[must_use]
    pub const fn new(msgid: i32, token: Uuid) -> Self {
        Self { msgid, token }
    }

    /// Returns the protocol message id of the search.
    #[must_use]
    pub const fn msgid(&self) -> i32 {
        self.msgid
    }

    /// Returns the request identity token.
    #[must_use]
    pub const fn token(&self) -> Uuid {
        self.token
    }
}

impl fmt::Display for SearchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search#{} ({})", self.msgid, self.token)
    }
}
