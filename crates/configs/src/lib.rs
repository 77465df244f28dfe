use std::time::Duration;

use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: Option<usize>,
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            worker_threads: default_worker_threads(),
            base_path: default_base_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
    /// Scope used on the app server when a request names none.
    #[serde(default = "default_app_server_scope")]
    pub app_server_default: String,
    /// Scope used on the zss server when a request names none.
    #[serde(default = "default_zss_scope")]
    pub zss_default: String,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub ha: HaConfig,
    #[serde(default)]
    pub remote: Option<RemoteStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_value_bytes: default_max_value_bytes(),
            app_server_default: default_app_server_scope(),
            zss_default: default_zss_scope(),
            cluster: ClusterConfig::default(),
            ha: HaConfig::default(),
            remote: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { channel_capacity: default_channel_capacity() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HaConfig {
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default)]
    pub write_quorum: Option<usize>,
}

impl Default for HaConfig {
    fn default() -> Self {
        Self { replicas: default_replicas(), write_quorum: None }
    }
}

/// External storage service that owns the `zss` namespaces.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteStorageConfig {
    pub url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_worker_threads() -> Option<usize> { Some(4) }
fn default_base_path() -> String { "/storage".into() }
fn default_log_format() -> String { "compact".into() }
fn default_data_dir() -> String { "data".into() }
fn default_max_value_bytes() -> usize { 64 * 1024 }
fn default_app_server_scope() -> String { "cluster".into() }
fn default_zss_scope() -> String { "ha".into() }
fn default_channel_capacity() -> usize { 256 }
fn default_replicas() -> usize { 3 }
fn default_connect_timeout() -> u64 { 5 }
fn default_request_timeout() -> u64 { 30 }

const KNOWN_SCOPES: [&str; 3] = ["local", "cluster", "ha"];

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `CONFIG_PATH` (or `config.toml`), falling back to defaults when the
    /// file is absent, then apply env overrides and validate.
    pub fn load_and_validate() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let mut cfg = if std::path::Path::new(&path).exists() {
            load_from_file(&path)?
        } else {
            AppConfig::default()
        };
        cfg.apply_env_overrides();
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = std::env::var("SERVER_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(w) = std::env::var("TOKIO_WORKER_THREADS").ok().and_then(|v| v.parse::<usize>().ok()) {
            self.server.worker_threads = Some(w);
        }
        if let Ok(dir) = std::env::var("STORAGE_DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Ok(url) = std::env::var("STORAGE_REMOTE_URL") {
            match self.storage.remote.as_mut() {
                Some(remote) => remote.url = url,
                None => {
                    self.storage.remote = Some(RemoteStorageConfig {
                        url,
                        connect_timeout_secs: default_connect_timeout(),
                        request_timeout_secs: default_request_timeout(),
                    })
                }
            }
        }
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.logging.normalize();
        self.storage.normalize_and_validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = default_host();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        let trimmed = self.base_path.trim().trim_end_matches('/');
        self.base_path = if trimmed.is_empty() {
            default_base_path()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Ok(())
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        self.format = match self.format.trim().to_lowercase().as_str() {
            "json" => "json".into(),
            _ => "compact".into(),
        };
    }
}

impl StorageConfig {
    pub fn normalize_and_validate(&mut self) -> Result<()> {
        if self.data_dir.trim().is_empty() {
            self.data_dir = default_data_dir();
        }
        if self.max_value_bytes == 0 {
            return Err(anyhow!("storage.max_value_bytes must be >= 1"));
        }
        for (name, scope) in [("app_server_default", &self.app_server_default), ("zss_default", &self.zss_default)] {
            if !KNOWN_SCOPES.contains(&scope.as_str()) {
                return Err(anyhow!("storage.{name} must be one of local, cluster, ha (got '{scope}')"));
            }
        }
        if self.zss_default == "cluster" {
            return Err(anyhow!("storage.zss_default cannot be 'cluster'; zss only offers local and ha"));
        }
        if self.cluster.channel_capacity == 0 {
            return Err(anyhow!("storage.cluster.channel_capacity must be >= 1"));
        }
        self.ha.normalize_and_validate()?;
        if let Some(remote) = &self.remote {
            remote.validate()?;
        }
        Ok(())
    }
}

impl HaConfig {
    fn normalize_and_validate(&mut self) -> Result<()> {
        if self.replicas == 0 {
            return Err(anyhow!("storage.ha.replicas must be >= 1"));
        }
        let quorum = self.write_quorum.unwrap_or(self.replicas / 2 + 1);
        if quorum == 0 || quorum > self.replicas {
            return Err(anyhow!("storage.ha.write_quorum must be in 1..={}", self.replicas));
        }
        self.write_quorum = Some(quorum);
        Ok(())
    }

    /// Majority of replicas unless configured explicitly.
    pub fn quorum(&self) -> usize {
        self.write_quorum.unwrap_or(self.replicas / 2 + 1)
    }
}

impl RemoteStorageConfig {
    pub fn validate(&self) -> Result<()> {
        let lower = self.url.trim().to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(anyhow!("storage.remote.url must start with http:// or https://"));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(anyhow!("storage.remote timeouts must be positive seconds"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let mut cfg = load_from_str("")?;
        cfg.normalize_and_validate()?;
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.base_path, "/storage");
        assert_eq!(cfg.storage.app_server_default, "cluster");
        assert_eq!(cfg.storage.zss_default, "ha");
        assert_eq!(cfg.storage.ha.replicas, 3);
        assert_eq!(cfg.storage.ha.quorum(), 2);
        assert!(cfg.storage.remote.is_none());
        Ok(())
    }

    #[test]
    fn parses_full_file() -> Result<()> {
        let mut cfg = load_from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            base_path = "plugins/sample/storage/"

            [logging]
            format = "JSON"

            [storage]
            data_dir = "/tmp/kv"
            max_value_bytes = 128
            app_server_default = "local"

            [storage.ha]
            replicas = 5
            write_quorum = 4

            [storage.remote]
            url = "http://zss.local:8542/storage"
            request_timeout_secs = 3
            "#,
        )?;
        cfg.normalize_and_validate()?;
        assert_eq!(cfg.server.base_path, "/plugins/sample/storage");
        assert_eq!(cfg.logging.format, "json");
        assert_eq!(cfg.storage.max_value_bytes, 128);
        assert_eq!(cfg.storage.ha.quorum(), 4);
        let remote = cfg.storage.remote.as_ref().expect("remote section");
        assert_eq!(remote.connect_timeout(), Duration::from_secs(5));
        assert_eq!(remote.request_timeout(), Duration::from_secs(3));
        Ok(())
    }

    #[test]
    fn rejects_invalid_values() {
        let mut cfg = AppConfig::default();
        cfg.storage.app_server_default = "disk".into();
        assert!(cfg.normalize_and_validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.storage.zss_default = "cluster".into();
        assert!(cfg.normalize_and_validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.storage.ha.write_quorum = Some(7);
        assert!(cfg.normalize_and_validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.storage.remote = Some(RemoteStorageConfig {
            url: "ftp://nope".into(),
            connect_timeout_secs: 1,
            request_timeout_secs: 1,
        });
        assert!(cfg.normalize_and_validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        assert!(cfg.normalize_and_validate().is_err());
    }

    #[test]
    fn partial_server_section_keeps_defaults() -> Result<()> {
        let mut cfg = load_from_str("[server]\nbase_path = \"/kv\"\n")?;
        cfg.normalize_and_validate()?;
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.worker_threads, Some(4));
        assert_eq!(cfg.server.base_path, "/kv");
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error_for_direct_load() {
        let path = std::env::temp_dir().join(format!("missing_{}.toml", uuid::Uuid::new_v4()));
        assert!(load_from_file(&path.to_string_lossy()).is_err());
    }
}
