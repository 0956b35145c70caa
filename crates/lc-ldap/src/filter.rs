//! Search filter construction.
//!
//! Filters are built by substituting the user's predicate into the
//! configured template. The predicate is inserted verbatim so users can
//! type their own wildcards; the result is bounded to [`FILTER_MAX_SIZE`].

use crate::error::{LdapError, LdapResult};

/// Placeholder replaced by the search predicate.
pub const PLACEHOLDER: &str = "%s";

/// Size of the filter buffer, terminator included.
pub const FILTER_MAX_SIZE: usize = 512;

/// Longest filter produced by [`build_filter`], in bytes.
pub const FILTER_MAX_LEN: usize = FILTER_MAX_SIZE - 1;

/// Substitutes `predicate` into `template`.
///
/// Only the first placeholder is replaced. Results longer than
/// [`FILTER_MAX_LEN`] bytes are cut at the last character boundary that
/// fits.
#[must_use]
pub fn build_filter(template: &str, predicate: &str) -> String {
    let mut filter = template.replacen(PLACEHOLDER, predicate, 1);

    if filter.len() > FILTER_MAX_LEN {
        let mut end = FILTER_MAX_LEN;
        while !filter.is_char_boundary(end) {
            end -= 1;
        }
        tracing::debug!(
            len = filter.len(),
            max = FILTER_MAX_LEN,
            "Truncating search filter"
        );
        filter.truncate(end);
    }

    filter
}

/// Checks that `filter` parses as an LDAP search filter.
///
/// Uses the same parser `ldap3` applies when encoding the request, so a
/// filter accepted here is never rejected once the search is under way.
pub fn check_syntax(filter: &str) -> LdapResult<()> {
    if filter.trim().is_empty() {
        return Err(LdapError::invalid_filter(filter, "empty filter"));
    }

    ldap3::parse_filter(filter)
        .map(|_| ())
        .map_err(|()| LdapError::invalid_filter(filter, "not a valid search filter"))
}
