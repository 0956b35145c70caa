//! Registry of in-flight searches.
//!
//! Requests are keyed by message id. Two lookups exist:
//!
//! - by id alone, used to route responses
//! - by id and identity token, used for cancellation, so a stale handle
//!   never cancels a newer request that reuses the same id

use std::collections::BTreeMap;

use lc_provider::SearchHandle;

use crate::error::{LdapError, LdapResult};
use crate::message::MessageId;
use crate::search::SearchRequest;

/// In-flight searches, ordered by message id.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: BTreeMap<MessageId, SearchRequest>,
}

impl RequestRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Registers a request and returns its handle.
    ///
    /// Fails if another pending request holds the same message id; the
    /// rejected request is dropped without delivery.
    pub fn insert(&mut self, request: SearchRequest) -> LdapResult<SearchHandle> {
        let msgid = request.msgid();
        if self.requests.contains_key(&msgid) {
            return Err(LdapError::DuplicateMessageId(msgid));
        }
        let handle = request.handle();
        self.requests.insert(msgid, request);
        Ok(handle)
    }

    /// Looks a request up by message id.
    #[must_use]
    pub fn get(&self, msgid: MessageId) -> Option<&SearchRequest> {
        self.requests.get(&msgid)
    }

    /// Looks a request up by message id, mutably.
    pub fn get_mut(&mut self, msgid: MessageId) -> Option<&mut SearchRequest> {
        self.requests.get_mut(&msgid)
    }

    /// Looks up the exact request designated by `handle`.
    #[must_use]
    pub fn find(&self, handle: &SearchHandle) -> Option<&SearchRequest> {
        self.requests
            .get(&handle.msgid())
            .filter(|request| request.matches(handle))
    }

    /// Removes a request by message id.
    pub fn remove(&mut self, msgid: MessageId) -> Option<SearchRequest> {
        self.requests.remove(&msgid)
    }

    /// Removes the exact request designated by `handle`.
    pub fn remove_exact(&mut self, handle: &SearchHandle) -> Option<SearchRequest> {
        self.find(handle)?;
        self.requests.remove(&handle.msgid())
    }

    /// Iterates pending requests in message id order.
    pub fn iter(&self) -> impl Iterator<Item = &SearchRequest> {
        self.requests.values()
    }

    /// Removes every pending request.
    pub fn drain(&mut self) -> Vec<SearchRequest> {
        std::mem::take(&mut self.requests).into_values().collect()
    }
}
