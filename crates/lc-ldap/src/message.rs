//! Protocol messages as seen by the dispatch loop.
//!
//! A [`DirectoryConnection`](crate::connection::DirectoryConnection) turns
//! whatever its protocol library returns into these types, so the
//! provider never touches library-specific structures.

use std::fmt;

use ldap3::SearchEntry;

/// Library-assigned identifier of one protocol operation.
pub type MessageId = i32;

/// LDAP result code for success.
pub const RC_SUCCESS: u32 = 0;

/// Result code used for failures raised on the client side
/// (RFC 4511 `other`).
pub const RC_LOCAL_ERROR: u32 = 80;

/// Outcome of a bind or search operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStatus {
    /// LDAP result code.
    pub code: u32,
    /// Diagnostic text.
    pub text: String,
}

impl ResultStatus {
    /// A successful result.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: RC_SUCCESS,
            text: String::new(),
        }
    }

    /// A failure detected on the client side.
    #[must_use]
    pub fn local_error(text: impl Into<String>) -> Self {
        Self {
            code: RC_LOCAL_ERROR,
            text: text.into(),
        }
    }

    /// Whether the operation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == RC_SUCCESS
    }
}

impl From<ldap3::LdapResult> for ResultStatus {
    fn from(result: ldap3::LdapResult) -> Self {
        Self {
            code: result.rc,
            text: result.text,
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "rc={}", self.code)
        } else {
            write!(f, "rc={} ({})", self.code, self.text)
        }
    }
}

/// One directory entry returned by a search.
///
/// Attributes are kept in the order the connection delivered them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished Name.
    pub dn: String,
    /// Attribute name and values, in delivery order.
    pub attributes: Vec<(String, Vec<String>)>,
}

impl DirectoryEntry {
    /// Creates an empty entry.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends a single-valued attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), vec![value.into()]));
        self
    }

    /// Appends a multi-valued attribute.
    #[must_use]
    pub fn with_values<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Converts an `ldap3` entry.
    ///
    /// `ldap3` hands attributes back as a map, so the requested attribute
    /// order is used first; attributes the server added on its own follow
    /// in name order.
    #[must_use]
    pub fn from_search_entry(entry: SearchEntry, requested: &[String]) -> Self {
        let mut attrs = entry.attrs;
        let mut attributes = Vec::with_capacity(attrs.len());

        for name in requested {
            let key = attrs
                .keys()
                .find(|k| k.eq_ignore_ascii_case(name))
                .cloned();
            if let Some(key) = key {
                if let Some(values) = attrs.remove(&key) {
                    attributes.push((key, values));
                }
            }
        }

        let mut rest: Vec<_> = attrs.into_iter().collect();
        rest.sort_by(|a, b| a.0.cmp(&b.0));
        attributes.extend(rest);

        Self {
            dn: entry.dn,
            attributes,
        }
    }
}

/// Payload of a protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Result of a bind operation.
    Bind(ResultStatus),
    /// One search result entry.
    SearchEntry(DirectoryEntry),
    /// A continuation reference to another server.
    SearchReference(Vec<String>),
    /// Terminal message of a search operation.
    SearchResult(ResultStatus),
    /// Intermediate response.
    Intermediate,
    /// Extended operation response.
    Extended,
    /// Any other response, identified by its protocol operation tag.
    Other(u64),
}

/// Discriminant of a [`MessageBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Bind response.
    Bind,
    /// Search result entry.
    SearchEntry,
    /// Search result reference.
    SearchReference,
    /// Search result done.
    SearchResult,
    /// Intermediate response.
    Intermediate,
    /// Extended response.
    Extended,
    /// Anything else.
    Other,
}

impl MessageKind {
    /// Whether messages of this kind belong to a search operation.
    #[must_use]
    pub const fn is_search(self) -> bool {
        matches!(
            self,
            Self::SearchEntry
                | Self::SearchReference
                | Self::SearchResult
                | Self::Intermediate
                | Self::Extended
        )
    }
}

/// A message received on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    /// Id of the operation this message answers.
    pub id: MessageId,
    /// Payload.
    pub body: MessageBody,
}

impl ProtocolMessage {
    /// Creates a message.
    #[must_use]
    pub const fn new(id: MessageId, body: MessageBody) -> Self {
        Self { id, body }
    }

    /// Returns the message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Bind(_) => MessageKind::Bind,
            MessageBody::SearchEntry(_) => MessageKind::SearchEntry,
            MessageBody::SearchReference(_) => MessageKind::SearchReference,
            MessageBody::SearchResult(_) => MessageKind::SearchResult,
            MessageBody::Intermediate => MessageKind::Intermediate,
            MessageBody::Extended => MessageKind::Extended,
            MessageBody::Other(_) => MessageKind::Other,
        }
    }

    /// Whether this message ends its operation.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.body, MessageBody::Bind(_) | MessageBody::SearchResult(_))
    }
}

/// Result of one non-blocking poll of the connection.
#[derive(Debug)]
pub enum PollOutcome {
    /// A batch of messages is ready. Never empty.
    Ready(Vec<ProtocolMessage>),
    /// Nothing is available yet.
    Empty,
    /// The poll failed; the caller retries on its next tick.
    TransientError(crate::error::LdapError),
}
