use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub blob_dir: String,
    pub io_timeout_ms: u64,
}

/// A reference network to resolve once before the listener starts.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PreloadNetwork {
    pub id: String,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub fetch_timeout_ms: u64,
    #[serde(default)]
    pub preload: Vec<PreloadNetwork>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub max_depth: usize,
    pub max_expansions: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OntologyConfig {
    #[serde(default)]
    pub index_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub search: SearchConfig,
    #[serde(default)]
    pub ontology: OntologyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("NETPATH").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Built-in values only; no files or environment.
    pub fn from_defaults() -> Result<Self, ConfigError> {
        Self::defaults()?.build()?.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5603)?
            .set_default("server.max_upload_bytes", 256 * 1024 * 1024)?
            .set_default("storage.blob_dir", ".")?
            .set_default("storage.io_timeout_ms", 30_000)?
            .set_default("remote.fetch_timeout_ms", 120_000)?
            .set_default("search.max_depth", 6)?
            .set_default("search.max_expansions", 200_000)
    }
}

impl StorageConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl RemoteConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::from_defaults().expect("defaults");
        assert_eq!(config.server.port, 5603);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.blob_dir, ".");
        assert_eq!(config.search.max_depth, 6);
        assert!(config.remote.preload.is_empty());
        assert!(config.ontology.index_path.is_none());
        assert_eq!(config.remote.fetch_timeout(), Duration::from_secs(120));
    }
}
