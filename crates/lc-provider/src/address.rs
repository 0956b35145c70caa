//! Address parsing seam.
//!
//! Providers hand the raw address attribute of a directory entry to an
//! [`AddressParser`]. A `None` result drops the entry.

use url::Url;

use crate::contact::ContactAddress;

/// Turns a raw directory string into a reachable address.
pub trait AddressParser: Send {
    /// Parses `raw`, returning `None` if it is not a usable address.
    fn parse(&self, raw: &str) -> Option<ContactAddress>;
}

impl<F> AddressParser for F
where
    F: Fn(&str) -> Option<ContactAddress> + Send,
{
    fn parse(&self, raw: &str) -> Option<ContactAddress> {
        self(raw)
    }
}

const SCHEMES: [&str; 3] = ["sip", "sips", "tel"];

/// SIP-oriented address parser.
///
/// Accepts:
/// - `sip:`, `sips:` and `tel:` URIs with a non-empty body
/// - bare `user@host`, which becomes `sip:user@host`
/// - bare user parts such as phone numbers, which become
///   `sip:user@<default domain>` when a default domain is set
#[derive(Debug, Clone, Default)]
pub struct SipAddressParser {
    default_domain: Option<String>,
}

impl SipAddressParser {
    /// Creates a parser without a default domain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser that completes bare user parts with `domain`.
    #[must_use]
    pub fn with_default_domain(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            default_domain: (!domain.trim().is_empty()).then(|| domain.trim().to_string()),
        }
    }

    /// Returns the default domain, if any.
    #[must_use]
    pub fn default_domain(&self) -> Option<&str> {
        self.default_domain.as_deref()
    }

    fn parse_uri(candidate: &str) -> Option<ContactAddress> {
        if candidate.chars().any(char::is_whitespace) {
            return None;
        }
        let uri = Url::parse(candidate).ok()?;
        if !SCHEMES.contains(&uri.scheme()) || uri.path().is_empty() {
            return None;
        }
        Some(ContactAddress::new(uri))
    }
}

impl AddressParser for SipAddressParser {
    fn parse(&self, raw: &str) -> Option<ContactAddress> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some((scheme, _)) = raw.split_once(':') {
            if SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
                return Self::parse_uri(raw);
            }
        }

        if raw.contains('@') {
            return Self::parse_uri(&format!("sip:{raw}"));
        }

        let domain = self.default_domain.as_deref()?;
        let user: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        Self::parse_uri(&format!("sip:{user}@{domain}"))
    }
}
