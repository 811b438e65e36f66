//! Configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `MEDREF__SECTION__KEY` environment variables.
//!
//! ```toml
//! [server]
//! http_port = 8080
//! default_lang = "uk"
//!
//! [store]
//! backend = "memory"
//! snapshot = "data/medref.json"
//!
//! [search.suggest]
//! uk = ["drug", "inn", "class-atc"]
//! ```

use crate::catalog::suggest::SuggestPlan;
use crate::error::{Error, Result};
use crate::model::Lang;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Full application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub catalog: CatalogConfig,
    pub search: SearchConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub http_addr: String,
    /// HTTP port
    pub http_port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
    /// Language used when a request names none
    pub default_lang: Lang,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0".to_string(),
            http_port: 8080,
            enable_cors: true,
            max_body_size: 10 * 1024 * 1024, // 10MB
            timeout_secs: 30,
            default_lang: Lang::Uk,
        }
    }
}

/// Key-value backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Redis,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Server URL for the redis backend
    pub url: String,
    /// Maximum connections borrowed at once
    pub pool_size: usize,
    /// How long a task waits for a free connection
    pub acquire_timeout_ms: u64,
    /// Snapshot file for the memory backend
    pub snapshot: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            url: "redis://127.0.0.1:6379/0".to_string(),
            pool_size: 32,
            acquire_timeout_ms: 5_000,
            snapshot: None,
        }
    }
}

/// Batch engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Records per pipeline
    pub batch_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { batch_size: 256 }
    }
}

/// Search index and suggestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Namespaces queried for suggestions, per language code
    pub suggest: BTreeMap<String, Vec<String>>,
    /// Maximum suggestions returned
    pub suggest_limit: usize,
    /// Per-namespace deadline for a suggestion worker
    pub worker_timeout_ms: u64,
    /// Elements examined per index scan page
    pub scan_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let plan = |kinds: &[&str]| kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>();
        let mut suggest = BTreeMap::new();
        suggest.insert("en".to_string(), plan(&["drug", "inn", "maker"]));
        suggest.insert("ru".to_string(), plan(&["drug", "inn", "maker", "class-atc"]));
        suggest.insert(
            "uk".to_string(),
            plan(&["drug", "inn", "maker", "class-atc", "spec-dec"]),
        );
        Self {
            suggest,
            suggest_limit: 20,
            worker_timeout_ms: 2_000,
            scan_count: 500,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Reading configuration file");
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MEDREF")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.store.pool_size == 0 {
            return Err(Error::Config("store.pool_size must be positive".to_string()));
        }
        if self.catalog.batch_size == 0 {
            return Err(Error::Config("catalog.batch_size must be positive".to_string()));
        }
        if self.search.scan_count == 0 {
            return Err(Error::Config("search.scan_count must be positive".to_string()));
        }
        SuggestPlan::from_config(&self.search)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        let config = AppConfig::default();
        config.validate()?;
        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(config.server.default_lang, Lang::Uk);
        Ok(())
    }

    #[test]
    fn test_load_from_file_overrides_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("medref.toml");
        std::fs::write(
            &path,
            r#"
[server]
http_port = 9090
default_lang = "en"

[store]
pool_size = 4

[search.suggest]
en = ["drug", "spec-act"]
"#,
        )?;

        let config = AppConfig::load(Some(&path))?;
        assert_eq!(config.server.http_port, 9090);
        assert_eq!(config.server.default_lang, Lang::En);
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.catalog.batch_size, 256);
        assert_eq!(config.search.suggest["en"], vec!["drug", "spec-act"]);
        Ok(())
    }

    #[test]
    fn test_unknown_namespace_in_plan_is_rejected() {
        let mut config = AppConfig::default();
        config
            .search
            .suggest
            .insert("en".to_string(), vec!["pharmacy".to_string()]);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
