//! Proxy configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sproc_core::{Result, SprocError};

use crate::describe::DEFAULT_SCHEMA;

/// Naming and timeout rules applied when compiling and calling contracts
///
/// Loadable from TOML:
///
/// ```toml
/// default_schema = "sales"
/// async_suffixes = ["_async", "Async"]
/// command_timeout_secs = 15
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Schema for procedures without a `schema` annotation
    default_schema: String,
    /// Suffixes stripped from async method names, matched case-insensitively
    async_suffixes: Vec<String>,
    /// Timeout applied to every command issued by a proxy
    command_timeout_secs: u64,
}

impl ProxyConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: ProxyConfig = toml::from_str(source)
            .map_err(|e| SprocError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the default procedure schema
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    /// Replace the async suffix list
    pub fn with_async_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.async_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the command timeout in seconds
    pub fn with_command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// Check the configuration for values no proxy could use
    pub fn validate(&self) -> Result<()> {
        if self.default_schema.trim().is_empty() {
            return Err(SprocError::Configuration(
                "default_schema must not be empty".to_string(),
            ));
        }
        if self.async_suffixes.iter().any(|s| s.is_empty()) {
            return Err(SprocError::Configuration(
                "async_suffixes must not contain an empty suffix".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(SprocError::Configuration(
                "command_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the default procedure schema
    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// Get the async suffixes
    pub fn async_suffixes(&self) -> &[String] {
        &self.async_suffixes
    }

    /// Get the command timeout as a Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Strip the first matching async suffix from `name`.
    ///
    /// A suffix that makes up the whole name is left in place.
    pub fn strip_async_suffix<'a>(&self, name: &'a str) -> &'a str {
        for suffix in &self.async_suffixes {
            if name.len() <= suffix.len() {
                continue;
            }
            let split = name.len() - suffix.len();
            if !name.is_char_boundary(split) {
                continue;
            }
            let (stem, tail) = name.split_at(split);
            if tail.eq_ignore_ascii_case(suffix) {
                return stem;
            }
        }
        name
    }
}

impl Default for ProxyConfig {
    /// Defaults:
    /// - default_schema: "dbo"
    /// - async_suffixes: "_async", "Async"
    /// - command_timeout: 30 seconds
    fn default() -> Self {
        Self {
            default_schema: DEFAULT_SCHEMA.to_string(),
            async_suffixes: vec!["_async".to_string(), "Async".to_string()],
            command_timeout_secs: 30,
        }
    }
}
