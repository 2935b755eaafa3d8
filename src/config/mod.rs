//! Shipper configuration.
//!
//! The configuration is loaded either from `SHIPPER_*` environment variables
//! or, when `SHIPPER_CONFIG` points at a file, from a camelCase JSON document
//! with the same fields.
//!
//! ```json
//! {
//!   "secure": true,
//!   "server": "ingest.example.com",
//!   "logsToken": "T1",
//!   "statsToken": "T2",
//!   "tokenByMatch": [{ "pattern": "nginx.*", "token": "T3" }],
//!   "label": { "pattern": "^(\\w+)-\\d+$", "template": "$1" },
//!   "events": false,
//!   "add": { "env": "prod" }
//! }
//! ```
use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::record::Channel;

mod env;
mod error;

pub use error::{Error, Result};

/// Environment variable holding the path of a JSON configuration file.
pub const CONFIG_PATH_VAR: &str = "SHIPPER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Connect over TLS instead of plain TCP.
    #[serde(default)]
    pub secure: bool,
    /// Host name of the ingestion endpoint.
    pub server: String,
    /// Port of the ingestion endpoint, see [`Config::port`].
    #[serde(default)]
    pub port: Option<u16>,
    /// Token shared by every channel without its own token.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub logs_token: Option<String>,
    #[serde(default)]
    pub stats_token: Option<String>,
    #[serde(default)]
    pub events_token: Option<String>,
    /// Image name rules, evaluated top to bottom.
    #[serde(default)]
    pub token_by_match: Vec<TokenByMatch>,
    #[serde(default)]
    pub label: Option<LabelConfig>,
    #[serde(default = "enabled")]
    pub logs: bool,
    #[serde(default = "enabled")]
    pub stats: bool,
    #[serde(default = "enabled")]
    pub events: bool,
    /// Tags merged into every record.
    #[serde(default)]
    pub add: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenByMatch {
    pub pattern: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelConfig {
    pub pattern: String,
    pub template: String,
}

fn enabled() -> bool {
    true
}

fn non_empty(token: Option<&String>) -> Option<&str> {
    token.map(String::as_str).filter(|token| !token.is_empty())
}

impl Config {
    /// Loads the configuration from the file named by `SHIPPER_CONFIG`, or
    /// from the `SHIPPER_*` environment variables when it is unset.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        env::from_vars(vars)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the configured port, or the default port for the transport.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.secure { 443 } else { 80 })
    }

    /// Fallback token for log records no image rule matched.
    pub fn logs_token(&self) -> Option<&str> {
        non_empty(self.logs_token.as_ref()).or_else(|| non_empty(self.token.as_ref()))
    }

    pub fn stats_token(&self) -> Option<&str> {
        non_empty(self.stats_token.as_ref()).or_else(|| non_empty(self.token.as_ref()))
    }

    pub fn events_token(&self) -> Option<&str> {
        non_empty(self.events_token.as_ref()).or_else(|| non_empty(self.token.as_ref()))
    }

    /// Returns the channels that are enabled and have a usable token.
    ///
    /// The logs channel is usable with a fallback token or with at least one
    /// image rule.
    pub fn enabled_channels(&self) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(3);
        if self.logs && (self.logs_token().is_some() || !self.token_by_match.is_empty()) {
            channels.push(Channel::Logs);
        }
        if self.stats && self.stats_token().is_some() {
            channels.push(Channel::Stats);
        }
        if self.events && self.events_token().is_some() {
            channels.push(Channel::Events);
        }
        channels
    }
}
