// ⚙️ Configuration - where the store lives and how long to wait for it

use crate::db::LEDGER_ACTOR;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB: &str = "ROADEYE_DB";
pub const ENV_BUSY_TIMEOUT_MS: &str = "ROADEYE_BUSY_TIMEOUT_MS";
pub const ENV_BIND: &str = "ROADEYE_BIND";
pub const ENV_ACTOR: &str = "ROADEYE_ACTOR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// How long a write waits for another writer before failing
    pub busy_timeout_ms: u64,

    /// Listen address for the HTTP server
    pub bind_addr: String,

    /// Who the activity log credits with writes made through the CLI, and
    /// through the server when a request names no actor
    pub actor: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: PathBuf::from("roadeye.db"),
            busy_timeout_ms: 5000,
            bind_addr: "127.0.0.1:3000".to_string(),
            actor: LEDGER_ACTOR.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Defaults overridden by `ROADEYE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LedgerConfig::default();

        if let Some(path) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            config.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms = raw.trim().parse().with_context(|| {
                format!("{ENV_BUSY_TIMEOUT_MS} must be milliseconds, got '{raw}'")
            })?;
        }

        if let Some(addr) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            config.bind_addr = addr;
        }

        if let Some(actor) = lookup(ENV_ACTOR).filter(|v| !v.trim().is_empty()) {
            config.actor = actor.trim().to_string();
        }

        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
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
    fn test_defaults_without_env() {
        let config = LedgerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.actor, LEDGER_ACTOR);
    }

    #[test]
    fn test_env_overrides() {
        let config = LedgerConfig::from_lookup(lookup_from(&[
            (ENV_DB, "/tmp/roadeye-test.db"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_BIND, "0.0.0.0:8080"),
            (ENV_ACTOR, " U001 "),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/roadeye-test.db"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.actor, "U001");
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let result = LedgerConfig::from_lookup(lookup_from(&[(ENV_BUSY_TIMEOUT_MS, "soon")]));
        assert!(result.is_err());
    }
}
