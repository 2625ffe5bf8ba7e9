//! Connection trait and connection configuration

use crate::{Command, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An open database connection.
///
/// The caller owns the connection's lifetime and transactional context;
/// commands are only ever created from it, never closed through it.
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mssql", "mock")
    fn driver_name(&self) -> &str;

    /// Create a new command bound to this connection
    fn create_command(&self) -> Result<Box<dyn Command + '_>>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Connection configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "mssql")
    pub driver: String,
    /// Host address
    #[serde(default)]
    pub host: String,
    /// Port number (0 for the driver default)
    #[serde(default)]
    pub port: u16,
    /// Database name
    #[serde(default)]
    pub database: Option<String>,
    /// Username
    #[serde(default)]
    pub username: Option<String>,
    /// Password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Additional driver parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration for the given driver
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            ..Default::default()
        }
    }

    /// Create a SQL Server configuration
    pub fn new_mssql(host: &str, port: u16, database: &str, username: &str) -> Self {
        let mut config = Self::new("mssql");
        config.host = host.to_string();
        config.port = port;
        config.database = Some(database.to_string());
        config.username = Some(username.to_string());
        config
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let str_val = match value.into() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" if !self.host.is_empty() => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    /// Get a boolean parameter, accepting `true`/`1`
    pub fn get_flag(&self, key: &str) -> bool {
        self.params
            .get(key)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }
}
