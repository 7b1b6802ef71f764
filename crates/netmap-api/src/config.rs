//! Process configuration, read once from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:5000";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen: SocketAddr,
    /// SQLite file for devices and the audit log. `None` keeps both in memory.
    pub database: Option<PathBuf>,
    pub admin_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid NETMAP_LISTEN {value:?}: {source}")]
    Listen {
        value: String,
        source: std::net::AddrParseError,
    },
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let listen_raw = get("NETMAP_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen_raw
            .parse()
            .map_err(|source| ConfigError::Listen {
                value: listen_raw.clone(),
                source,
            })?;
        Ok(Self {
            listen,
            database: get("NETMAP_DATABASE").map(PathBuf::from),
            admin_token: get("ADMIN_TOKEN"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.listen.to_string(), DEFAULT_LISTEN);
        assert!(cfg.database.is_none());
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn reads_values_and_ignores_blank_ones() {
        let cfg = ApiConfig::from_lookup(lookup(&[
            ("NETMAP_LISTEN", "127.0.0.1:8080"),
            ("NETMAP_DATABASE", "/var/lib/netmap/devices.db"),
            ("ADMIN_TOKEN", ""),
        ]))
        .unwrap();
        assert_eq!(cfg.listen.port(), 8080);
        assert_eq!(
            cfg.database.as_deref(),
            Some(std::path::Path::new("/var/lib/netmap/devices.db"))
        );
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn rejects_bad_listen_address() {
        let err = ApiConfig::from_lookup(lookup(&[("NETMAP_LISTEN", "nowhere")])).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }
}
