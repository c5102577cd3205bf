// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::net::SocketAddr;

use anyhow::{Context, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://database/chello.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_TREE_DEPTH: usize = 64;

const DATABASE_URL_VAR: &str = "CHELLO_DATABASE_URL";
const BIND_ADDR_VAR: &str = "CHELLO_BIND_ADDR";
const MAX_TREE_DEPTH_VAR: &str = "CHELLO_MAX_TREE_DEPTH";

/// Startup configuration, read once and then shared through the application state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Deepest task nesting the tree builder accepts before treating the
    /// project as corrupt.
    pub max_tree_depth: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3000))),
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to defaults
    /// for missing keys. Present but malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(DATABASE_URL_VAR) {
            if url.trim().is_empty() {
                anyhow::bail!("{} must not be empty", DATABASE_URL_VAR);
            }
            config.database_url = url;
        }

        if let Some(addr) = lookup(BIND_ADDR_VAR) {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("Invalid {}: {}", BIND_ADDR_VAR, addr))?;
        }

        if let Some(depth) = lookup(MAX_TREE_DEPTH_VAR) {
            let depth: usize = depth
                .parse()
                .with_context(|| format!("Invalid {}: {}", MAX_TREE_DEPTH_VAR, depth))?;
            if depth == 0 {
                anyhow::bail!("{} must be at least 1", MAX_TREE_DEPTH_VAR);
            }
            config.max_tree_depth = depth;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.max_tree_depth, DEFAULT_MAX_TREE_DEPTH);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("CHELLO_DATABASE_URL", "sqlite::memory:"),
            ("CHELLO_BIND_ADDR", "127.0.0.1:8080"),
            ("CHELLO_MAX_TREE_DEPTH", "8"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_tree_depth, 8);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[("CHELLO_BIND_ADDR", "nowhere")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("CHELLO_MAX_TREE_DEPTH", "-1")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("CHELLO_MAX_TREE_DEPTH", "0")])).is_err());
    }
}
