//! LDAP contact provider configuration.
//!
//! The configuration block is read once from the host's
//! [`ConfigStore`] (section [`CONFIG_SECTION`]) and is immutable for the
//! lifetime of a provider session. Reloading replaces the whole block.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use lc_provider::ConfigStore;
use serde::{Deserialize, Serialize};

use crate::error::{LdapError, LdapResult};
use crate::filter::PLACEHOLDER;

/// Host configuration section holding the directory settings.
pub const CONFIG_SECTION: &str = "directory";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RESULTS: u32 = 50;
const DEFAULT_BASE_OBJECT: &str = "dc=example,dc=com";
const DEFAULT_SERVER: &str = "ldap://localhost:10389";
const DEFAULT_FILTER: &str = "uid=*%s*";
const DEFAULT_NAME_ATTRIBUTE: &str = "givenName";
const DEFAULT_SIP_ATTRIBUTE: &str = "mobile";
const DEFAULT_ATTRIBUTES: &str = "telephoneNumber,givenName,sn,mobile,homePhone";

// ============================================================================
// Auth Method
// ============================================================================

/// How the provider authenticates to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Anonymous simple bind.
    #[default]
    Anonymous,
    /// Simple bind with username and password.
    Plain,
    /// Reserved. Binding with this method performs no operation.
    Sasl,
}

impl AuthMethod {
    /// Returns the configuration name of the method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Plain => "plain",
            Self::Sasl => "sasl",
        }
    }

    /// Parses a configuration value, falling back to anonymous.
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            tracing::warn!(value, "Unknown auth_method, using anonymous");
            Self::Anonymous
        })
    }
}

impl FromStr for AuthMethod {
    type Err = LdapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "anonymous" => Ok(Self::Anonymous),
            "plain" => Ok(Self::Plain),
            "sasl" => Ok(Self::Sasl),
            other => Err(LdapError::config(format!("unknown auth method '{other}'"))),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Alias Dereferencing
// ============================================================================

/// Alias dereferencing policy for searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerefPolicy {
    /// Never dereference aliases.
    #[default]
    Never,
    /// Dereference while searching below the base object.
    Searching,
    /// Dereference when locating the base object.
    Finding,
    /// Always dereference.
    Always,
}

impl DerefPolicy {
    /// Maps the numeric configuration value, falling back to `Never`.
    #[must_use]
    pub fn from_config(value: i64) -> Self {
        match value {
            0 => Self::Never,
            1 => Self::Searching,
            2 => Self::Finding,
            3 => Self::Always,
            other => {
                tracing::warn!(value = other, "Invalid deref_aliases, using never");
                Self::Never
            }
        }
    }

    /// Returns the numeric protocol value.
    #[must_use]
    pub const fn as_int(&self) -> i64 {
        match self {
            Self::Never => 0,
            Self::Searching => 1,
            Self::Finding => 2,
            Self::Always => 3,
        }
    }

    /// Converts to the ldap3 policy.
    #[must_use]
    pub const fn to_ldap3(&self) -> ldap3::DerefAliases {
        match self {
            Self::Never => ldap3::DerefAliases::Never,
            Self::Searching => ldap3::DerefAliases::Searching,
            Self::Finding => ldap3::DerefAliases::Finding,
            Self::Always => ldap3::DerefAliases::Always,
        }
    }
}

// ============================================================================
// Directory Configuration
// ============================================================================

/// Directory connection and mapping parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    // === Connection ===
    /// Endpoint URI (`ldap://`, `ldaps://` or `ldapi://`).
    pub server: String,

    /// Use StartTLS on `ldap://` endpoints.
    pub use_tls: bool,

    /// Authentication method.
    pub auth_method: AuthMethod,

    /// Bind DN for plain authentication.
    pub username: String,

    /// Bind password.
    #[serde(skip_serializing, default)]
    pub password: String,

    // === Search ===
    /// Base DN searches start from.
    pub base_object: String,

    /// Filter template with exactly one `%s` placeholder.
    pub filter: String,

    /// Per-search timeout.
    pub timeout: Duration,

    /// Server-side cap on returned entries.
    pub max_results: u32,

    /// Alias dereferencing policy.
    pub deref_aliases: DerefPolicy,

    // === Mapping ===
    /// Attribute mapped to the contact name.
    pub name_attribute: String,

    /// Attribute mapped to the contact address.
    pub sip_attribute: String,

    /// Attributes requested from the server, in order.
    pub attributes: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            use_tls: false,
            auth_method: AuthMethod::Anonymous,
            username: String::new(),
            password: String::new(),
            base_object: DEFAULT_BASE_OBJECT.to_string(),
            filter: DEFAULT_FILTER.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_results: DEFAULT_MAX_RESULTS,
            deref_aliases: DerefPolicy::Never,
            name_attribute: DEFAULT_NAME_ATTRIBUTE.to_string(),
            sip_attribute: DEFAULT_SIP_ATTRIBUTE.to_string(),
            attributes: parse_attribute_list(DEFAULT_ATTRIBUTES),
        }
    }
}

impl DirectoryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> DirectoryConfigBuilder {
        DirectoryConfigBuilder::new()
    }

    /// Reads the configuration from the host store.
    ///
    /// Missing keys take their documented defaults. The result is not
    /// validated; call [`validate`](Self::validate) before use.
    #[must_use]
    pub fn from_store(store: &dyn ConfigStore) -> Self {
        let section = CONFIG_SECTION;
        let timeout = store.get_int(section, "timeout", DEFAULT_TIMEOUT_SECS as i64);
        let max_results = store.get_int(section, "max_results", i64::from(DEFAULT_MAX_RESULTS));

        Self {
            server: store.get_string(section, "server", DEFAULT_SERVER),
            use_tls: store.get_int(section, "use_tls", 0) != 0,
            auth_method: AuthMethod::from_config(&store.get_string(
                section,
                "auth_method",
                AuthMethod::Anonymous.as_str(),
            )),
            username: store.get_string(section, "username", ""),
            password: store.get_string(section, "password", ""),
            base_object: store.get_string(section, "base_object", DEFAULT_BASE_OBJECT),
            filter: store.get_string(section, "filter", DEFAULT_FILTER),
            timeout: Duration::from_secs(u64::try_from(timeout).unwrap_or(DEFAULT_TIMEOUT_SECS)),
            max_results: u32::try_from(max_results).unwrap_or(DEFAULT_MAX_RESULTS),
            deref_aliases: DerefPolicy::from_config(store.get_int(section, "deref_aliases", 0)),
            name_attribute: store.get_string(section, "name_attribute", DEFAULT_NAME_ATTRIBUTE),
            sip_attribute: store.get_string(section, "sip_attribute", DEFAULT_SIP_ATTRIBUTE),
            attributes: parse_attribute_list(&store.get_string(
                section,
                "attributes",
                DEFAULT_ATTRIBUTES,
            )),
        }
    }

    /// Validates the configuration.
    ///
    /// An attribute list that lacks the name or address attribute is
    /// accepted with a warning: searches run, but no entry can map.
    pub fn validate(&self) -> LdapResult<()> {
        let server = self.server.to_lowercase();
        if server.is_empty() {
            return Err(LdapError::config("server cannot be empty"));
        }
        if !["ldap://", "ldaps://", "ldapi://"]
            .iter()
            .any(|scheme| server.starts_with(scheme))
        {
            return Err(LdapError::config(format!(
                "server must be an ldap://, ldaps:// or ldapi:// URI, got '{}'",
                self.server
            )));
        }

        if self.base_object.trim().is_empty() {
            return Err(LdapError::config("base_object cannot be empty"));
        }

        let placeholders = self.filter.matches(PLACEHOLDER).count();
        if placeholders != 1 {
            return Err(LdapError::config(format!(
                "filter must contain exactly one '{PLACEHOLDER}', found {placeholders}"
            )));
        }

        if self.name_attribute.trim().is_empty() || self.sip_attribute.trim().is_empty() {
            return Err(LdapError::config(
                "name_attribute and sip_attribute cannot be empty",
            ));
        }

        if self.attributes.is_empty() {
            return Err(LdapError::config("attributes cannot be empty"));
        }

        for required in [&self.name_attribute, &self.sip_attribute] {
            if !self.requests_attribute(required) {
                tracing::warn!(
                    attribute = %required,
                    "Mapped attribute is not in the requested attribute list; no contact can be built"
                );
            }
        }

        Ok(())
    }

    /// Whether `name` is in the requested attribute list.
    #[must_use]
    pub fn requests_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Whether the endpoint encrypts from connection start.
    #[must_use]
    pub fn is_ldaps(&self) -> bool {
        self.server.to_lowercase().starts_with("ldaps://")
    }
}

/// Splits a comma-separated attribute list, dropping blanks.
fn parse_attribute_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect()
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for directory configuration.
#[derive(Debug, Default)]
pub struct DirectoryConfigBuilder {
    config: DirectoryConfig,
}

impl DirectoryConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server URI.
    #[must_use]
    pub fn server(mut self, url: impl Into<String>) -> Self {
        self.config.server = url.into();
        self
    }

    /// Enables StartTLS.
    #[must_use]
    pub const fn use_tls(mut self, enabled: bool) -> Self {
        self.config.use_tls = enabled;
        self
    }

    /// Sets plain authentication with the given credentials.
    #[must_use]
    pub fn plain_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.auth_method = AuthMethod::Plain;
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    /// Sets the authentication method.
    #[must_use]
    pub const fn auth_method(mut self, method: AuthMethod) -> Self {
        self.config.auth_method = method;
        self
    }

    /// Sets the base DN.
    #[must_use]
    pub fn base_object(mut self, dn: impl Into<String>) -> Self {
        self.config.base_object = dn.into();
        self
    }

    /// Sets the filter template.
    #[must_use]
    pub fn filter(mut self, template: impl Into<String>) -> Self {
        self.config.filter = template.into();
        self
    }

    /// Sets the per-search timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the server-side result cap.
    #[must_use]
    pub const fn max_results(mut self, max: u32) -> Self {
        self.config.max_results = max;
        self
    }

    /// Sets the alias dereferencing policy.
    #[must_use]
    pub const fn deref_aliases(mut self, policy: DerefPolicy) -> Self {
        self.config.deref_aliases = policy;
        self
    }

    /// Sets the attribute mapped to the contact name.
    #[must_use]
    pub fn name_attribute(mut self, attr: impl Into<String>) -> Self {
        self.config.name_attribute = attr.into();
        self
    }

    /// Sets the attribute mapped to the contact address.
    #[must_use]
    pub fn sip_attribute(mut self, attr: impl Into<String>) -> Self {
        self.config.sip_attribute = attr.into();
        self
    }

    /// Sets the requested attributes.
    #[must_use]
    pub fn attributes<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.attributes = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> LdapResult<DirectoryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
