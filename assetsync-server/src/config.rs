//! Server configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::file_store::{DEFAULT_ASSETS_DIR, DEFAULT_METADATA_FILE};
use crate::project_cache::DEFAULT_CACHE_FILE;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// HTTP command and asset port
    pub port: u16,
    /// WebSocket push port
    pub ws_port: u16,
    /// Directory holding every project
    pub projects_root: PathBuf,
    pub assets_dir: String,
    pub metadata_file: String,
    /// Cache file name inside the projects root
    pub cache_file: String,
    /// How often buffered filesystem events are flushed
    pub fs_events_interval: Duration,
    /// Idle sessions are swept only when this is set
    pub session_idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7007,
            ws_port: 7001,
            projects_root: PathBuf::from("./projects"),
            assets_dir: DEFAULT_ASSETS_DIR.to_string(),
            metadata_file: DEFAULT_METADATA_FILE.to_string(),
            cache_file: DEFAULT_CACHE_FILE.to_string(),
            fs_events_interval: Duration::from_millis(1000),
            session_idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `HOST`, `PORT`, `WS_PORT`, `PROJECTS_ROOT`,
    /// `FS_EVENTS_INTERVAL_MS` and `SESSION_IDLE_TIMEOUT_SECS`
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("invalid PORT: {port}"))?;
        }
        if let Some(port) = lookup("WS_PORT") {
            config.ws_port = port
                .parse()
                .with_context(|| format!("invalid WS_PORT: {port}"))?;
        }
        if let Some(root) = lookup("PROJECTS_ROOT") {
            config.projects_root = PathBuf::from(root);
        }
        if let Some(ms) = lookup("FS_EVENTS_INTERVAL_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("invalid FS_EVENTS_INTERVAL_MS: {ms}"))?;
            anyhow::ensure!(ms > 0, "FS_EVENTS_INTERVAL_MS must be positive");
            config.fs_events_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = lookup("SESSION_IDLE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("invalid SESSION_IDLE_TIMEOUT_SECS: {secs}"))?;
            config.session_idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.projects_root.join(&self.cache_file)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 7007);
        assert_eq!(config.ws_port, 7001);
        assert_eq!(config.fs_events_interval, Duration::from_secs(1));
        assert_eq!(config.session_idle_timeout, None);
        assert_eq!(config.cache_path(), PathBuf::from("./projects/cache.json"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8000"),
            ("WS_PORT", "8001"),
            ("PROJECTS_ROOT", "/data/projects"),
            ("FS_EVENTS_INTERVAL_MS", "250"),
            ("SESSION_IDLE_TIMEOUT_SECS", "600"),
        ])
        .unwrap();
        assert_eq!(config.http_addr(), "127.0.0.1:8000");
        assert_eq!(config.ws_addr(), "127.0.0.1:8001");
        assert_eq!(config.projects_root, PathBuf::from("/data/projects"));
        assert_eq!(config.fs_events_interval, Duration::from_millis(250));
        assert_eq!(config.session_idle_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("PORT", "http")]).is_err());
        assert!(config_from(&[("FS_EVENTS_INTERVAL_MS", "0")]).is_err());
    }
}
