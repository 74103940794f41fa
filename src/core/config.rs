use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub coingecko: Option<CoinGeckoProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(CoinGeckoProviderConfig {
                base_url: "https://api.coingecko.com".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Quote currency for prices and market caps.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Number of assets fetched when no limit is given on the command line.
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    /// Seconds after which cached market data is considered stale.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    pub data_path: Option<String>,
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_limit() -> u32 {
    100
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            currency: default_currency(),
            default_limit: default_limit(),
            cache_ttl_secs: default_cache_ttl_secs(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "coinlens", "coinlens")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "coinlens", "coinlens")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn coingecko_base_url(&self) -> &str {
        self.providers
            .coingecko
            .as_ref()
            .map_or("https://api.coingecko.com", |p| p.base_url.as_str())
    }
}
