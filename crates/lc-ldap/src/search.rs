//! In-flight search requests.
//!
//! A [`SearchRequest`] owns everything one search accumulates between
//! submission and delivery: its filter, the contacts mapped so far, and the
//! caller's callback.

use std::fmt;

use lc_provider::{Contact, SearchCallback, SearchHandle};
use uuid::Uuid;

use crate::message::{MessageId, ResultStatus};

/// One pending search operation.
pub struct SearchRequest {
    msgid: MessageId,
    token: Uuid,
    predicate: String,
    filter: String,
    complete: bool,
    status: Option<ResultStatus>,
    contacts: Vec<Contact>,
    callback: Option<SearchCallback>,
}

impl SearchRequest {
    /// Creates a request for an operation the connection accepted.
    #[must_use]
    pub fn new(
        msgid: MessageId,
        predicate: impl Into<String>,
        filter: impl Into<String>,
        callback: SearchCallback,
    ) -> Self {
        Self {
            msgid,
            token: Uuid::now_v7(),
            predicate: predicate.into(),
            filter: filter.into(),
            complete: false,
            status: None,
            contacts: Vec::new(),
            callback: Some(callback),
        }
    }

    /// Returns the protocol message id.
    #[must_use]
    pub const fn msgid(&self) -> MessageId {
        self.msgid
    }

    /// Returns the identity token.
    #[must_use]
    pub const fn token(&self) -> Uuid {
        self.token
    }

    /// Returns a caller handle for this request.
    #[must_use]
    pub const fn handle(&self) -> SearchHandle {
        SearchHandle::new(self.msgid, self.token)
    }

    /// Whether `handle` designates this exact request.
    #[must_use]
    pub fn matches(&self, handle: &SearchHandle) -> bool {
        self.msgid == handle.msgid() && self.token == handle.token()
    }

    /// Returns the predicate the search was started with.
    #[must_use]
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Returns the filter sent to the server.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Whether the terminal message has been received.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns the terminal status, once complete.
    #[must_use]
    pub const fn status(&self) -> Option<&ResultStatus> {
        self.status.as_ref()
    }

    /// Returns the number of contacts found so far.
    #[must_use]
    pub fn found_count(&self) -> usize {
        self.contacts.len()
    }

    /// Returns the contacts found so far.
    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Appends a mapped contact.
    pub fn push_contact(&mut self, contact: Contact) {
        self.contacts.push(contact);
    }

    /// Records the terminal message.
    pub fn complete(&mut self, status: ResultStatus) {
        self.complete = true;
        self.status = Some(status);
    }

    /// Hands the accumulated contacts to the callback.
    ///
    /// Consumes the request, so a request delivers at most once.
    pub fn deliver(mut self) {
        let contacts = std::mem::take(&mut self.contacts);
        if let Some(callback) = self.callback.take() {
            tracing::info!(
                msgid = self.msgid,
                predicate = %self.predicate,
                count = contacts.len(),
                "Delivering search results"
            );
            callback(contacts);
        }
    }
}

impl fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRequest")
            .field("msgid", &self.msgid)
            .field("token", &self.token)
            .field("predicate", &self.predicate)
            .field("filter", &self.filter)
            .field("complete", &self.complete)
            .field("status", &self.status)
            .field("found", &self.contacts.len())
            .finish_non_exhaustive()
    }
}

impl Drop for SearchRequest {
    fn drop(&mut self) {
        if self.callback.is_some() {
            tracing::debug!(msgid = self.msgid, "Releasing undelivered search");
        }
    }
}
