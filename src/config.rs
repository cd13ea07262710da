//! Application configuration.
//!
//! ```toml
//! debug = false
//! default_environment = "default"
//!
//! [[environments]]
//! name = "production"
//! hosts = ["*.example.com"]
//!
//! [[environments]]
//! name = "local"
//! hosts = ["localhost", "*.test"]
//! ```
//!
//! Environments are an array of tables so declaration order survives
//! parsing; detection takes the first environment with a matching host.

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::pattern;

const DEFAULT_ENVIRONMENT: &str = "default";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Render error details in the fallback error page.
    pub debug: bool,
    /// Environment name used when no host pattern matches.
    pub default_environment: String,
    pub environments: Environments,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            default_environment: DEFAULT_ENVIRONMENT.to_owned(),
            environments: Environments::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// The environment for `host`, or the configured default.
    pub fn detect_environment(&self, host: &str) -> &str {
        self.environments.detect(host).unwrap_or(&self.default_environment)
    }
}

/// One environment and the host patterns that select it.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct EnvironmentRule {
    pub name: String,
    pub hosts: Vec<String>,
}

/// Environment rules in declaration order.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Environments(Vec<EnvironmentRule>);

impl Environments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an environment. Chainable.
    pub fn add<I, S>(mut self, name: &str, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.push(EnvironmentRule {
            name: name.to_owned(),
            hosts: hosts.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// The first environment, in declaration order, with a host pattern
    /// matching `host`. Matching is case-sensitive.
    pub fn detect(&self, host: &str) -> Option<&str> {
        self.0.iter()
            .find(|env| env.hosts.iter().any(|p| pattern::is_match(p, host)))
            .map(|env| env.name.as_str())
    }

    pub fn rules(&self) -> &[EnvironmentRule] {
        &self.0
    }
}
