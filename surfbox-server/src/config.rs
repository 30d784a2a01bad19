use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use surfbox_core::{Result, SurfError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub meta_store: MetaStoreConfig,
    #[serde(default)]
    pub block_store: BlockStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default)]
    pub meta_store_addr: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            block_size: default_block_size(),
            meta_store_addr: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ClientConfig {
    pub fn base_dir(&self) -> Result<&Path> {
        self.base_dir
            .as_deref()
            .ok_or_else(|| SurfError::Config("client.base_dir is required".to_string()))
    }

    pub fn meta_store_addr(&self) -> Result<&str> {
        self.meta_store_addr
            .as_deref()
            .filter(|addr| !addr.trim().is_empty())
            .ok_or_else(|| SurfError::Config("client.meta_store_addr is required".to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_block_size() -> usize {
    4096
}

fn default_request_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaStoreConfig {
    #[serde(default)]
    pub bind_addr: Option<String>,
    /// Block store addresses, as handed out to clients.
    #[serde(default)]
    pub block_store_addrs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockStoreConfig {
    #[serde(default)]
    pub bind_addr: Option<String>,
}

pub fn require_bind_addr<'a>(section: &str, bind_addr: &'a Option<String>) -> Result<&'a str> {
    bind_addr
        .as_deref()
        .filter(|addr| !addr.trim().is_empty())
        .ok_or_else(|| SurfError::Config(format!("{}.bind_addr is required", section)))
}

/// Command line values that take precedence over file and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    entries: Vec<(&'static str, Option<::config::Value>)>,
}

impl Overrides {
    pub fn set<V: Into<::config::Value>>(mut self, key: &'static str, value: Option<V>) -> Self {
        self.entries.push((key, value.map(Into::into)));
        self
    }
}

impl Config {
    /// Layers, lowest first: YAML file, `SURFBOX__*` environment, overrides.
    pub fn load(path: Option<&str>, overrides: Overrides) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("SURFBOX")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("meta_store.block_store_addrs"),
        );

        for (key, value) in overrides.entries {
            builder = builder
                .set_override_option(key, value)
                .map_err(|e| SurfError::Config(e.to_string()))?;
        }

        let settings = builder
            .build()
            .map_err(|e| SurfError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| SurfError::Config(e.to_string()))?;

        if config.client.block_size == 0 {
            return Err(SurfError::Config(
                "client.block_size must be positive".to_string(),
            ));
        }

        Ok(config)
    }
}
