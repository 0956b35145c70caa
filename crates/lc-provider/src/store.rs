//! Host configuration store seam.
//!
//! The host application owns a sectioned key/value configuration. Providers
//! read their settings through [`ConfigStore`] and supply their own defaults.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ProviderError, ProviderResult};

/// Sectioned key/value configuration owned by the host.
pub trait ConfigStore {
    /// Returns the integer value of `section.key`, or `default`.
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;

    /// Returns the string value of `section.key`, or `default`.
    fn get_string(&self, section: &str, key: &str, default: &str) -> String;
}

/// In-memory configuration store.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    values: HashMap<(String, String), String>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `section.key` to `value`.
    pub fn set(&mut self, section: &str, key: &str, value: impl ToString) -> &mut Self {
        self.values
            .insert((section.to_string(), key.to_string()), value.to_string());
        self
    }

    /// Builder-style variant of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, section: &str, key: &str, value: impl ToString) -> Self {
        self.set(section, key, value);
        self
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&str> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .map(String::as_str)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.lookup(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.lookup(section, key).unwrap_or(default).to_string()
    }
}

/// Configuration store backed by a TOML document.
///
/// Sections are top-level tables. Booleans read as integers `0`/`1`, and
/// arrays of strings read as comma-separated strings.
#[derive(Debug, Clone, Default)]
pub struct TomlConfigStore {
    table: toml::Table,
}

impl TomlConfigStore {
    /// Parses a TOML document.
    pub fn parse(content: &str) -> ProviderResult<Self> {
        let table = content
            .parse::<toml::Table>()
            .map_err(|e| ProviderError::config(format!("failed to parse config: {e}")))?;
        Ok(Self { table })
    }

    /// Loads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&toml::Value> {
        self.table.get(section)?.as_table()?.get(key)
    }
}

impl ConfigStore for TomlConfigStore {
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.lookup(section, key) {
            Some(toml::Value::Integer(i)) => *i,
            Some(toml::Value::Boolean(b)) => i64::from(*b),
            Some(toml::Value::String(s)) => s.trim().parse().unwrap_or(default),
            Some(other) => {
                tracing::warn!(section, key, value = %other, "Config value is not an integer");
                default
            }
            None => default,
        }
    }

    fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        match self.lookup(section, key) {
            Some(toml::Value::String(s)) => s.clone(),
            Some(toml::Value::Array(items)) => items
                .iter()
                .filter_map(toml::Value::as_str)
                .collect::<Vec<_>>()
                .join(","),
            Some(other @ (toml::Value::Integer(_) | toml::Value::Boolean(_) | toml::Value::Float(_))) => {
                other.to_string()
            }
            Some(other) => {
                tracing::warn!(section, key, value = %other, "Config value is not a string");
                default.to_string()
            }
            None => default.to_string(),
        }
    }
}
