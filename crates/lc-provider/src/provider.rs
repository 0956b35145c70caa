//! Contact provider trait.
//!
//! A contact provider resolves free-text search predicates into contacts
//! without blocking the host. The host submits searches, then calls
//! [`ContactProvider::iterate`] on a fixed cadence; results are delivered
//! through each search's callback from inside `iterate`.
//!
//! ## Implementation Notes
//!
//! - All methods are called from the host's own thread; providers do not
//!   need interior locking
//! - `iterate` must never block
//! - A cancelled search never invokes its callback

use crate::contact::{SearchCallback, SearchHandle};
use crate::error::ProviderResult;

/// Trait implemented by every contact provider backend.
pub trait ContactProvider {
    /// Returns the provider type identifier.
    fn provider_type(&self) -> &'static str;

    /// Starts a search for `predicate`.
    ///
    /// Returns a handle on success. On failure nothing is registered and
    /// the callback is dropped without being invoked.
    fn begin_search(
        &mut self,
        predicate: &str,
        callback: SearchCallback,
    ) -> ProviderResult<SearchHandle>;

    /// Cancels a pending search.
    ///
    /// The handle is consumed whether or not the search was still pending.
    /// Returns `ProviderError::SearchNotFound` if it was not.
    fn cancel_search(&mut self, handle: SearchHandle) -> ProviderResult<()>;

    /// Advances pending work by at most one step. Never blocks.
    fn iterate(&mut self);

    /// Returns the number of searches still pending.
    fn pending_count(&self) -> usize;

    /// Returns a human-readable dump of the provider state.
    ///
    /// Intended for operators; the format is not stable.
    fn describe(&self) -> String;
}
