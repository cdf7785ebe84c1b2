use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::processor::OutputLimits;
use crate::storage::backends::BackendConfigs;

static CONFIG: OnceCell<RuntimeConfig> = OnceCell::new();

/// The config loaded at startup.
///
/// Panics if [`init`] has not been called yet.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get().expect("config not initialised")
}

/// Reads and parses the config file, installing it as the process config.
pub async fn init(path: &Path) -> Result<(), ConfigError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let cfg = RuntimeConfig::from_yaml(&raw)?;
    CONFIG.set(cfg).map_err(|_| ConfigError::AlreadyInitialised)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_host")]
    /// The address to bind the server to.
    ///
    /// Defaults to `127.0.0.1`.
    pub host: String,

    /// The port to serve the API on.
    pub port: u16,

    /// The remote bucket thumbnails are published to.
    pub bucket: String,

    /// The region the bucket lives in, e.g. `eu-west-1`.
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// The directory scratch files are created in.
    ///
    /// Defaults to the OS temp directory.
    pub scratch_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// The maximum time in seconds a source download may take.
    ///
    /// If unset downloads are not bounded.
    pub fetch_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// The maximum time in seconds a single upload may take.
    ///
    /// If unset uploads are not bounded.
    pub upload_timeout: Option<u64>,

    #[serde(default = "default_max_dimension")]
    /// The largest width or height a thumbnail may have.
    ///
    /// Defaults to `10000`.
    pub max_dimension: u32,

    #[serde(default = "default_max_pixels")]
    /// The largest number of pixels a thumbnail may have.
    ///
    /// Defaults to `40000000`.
    pub max_pixels: u64,

    #[serde(default)]
    /// The storage backend thumbnails are published with.
    pub backend: BackendConfigs,
}

impl RuntimeConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// A config suitable for `init`, pointing at a placeholder bucket.
    pub fn template() -> Self {
        Self {
            host: default_host(),
            port: 8000,
            bucket: "thumbnails".to_string(),
            region: "eu-west-1".to_string(),
            scratch_dir: None,
            fetch_timeout: Some(30),
            upload_timeout: Some(60),
            max_dimension: default_max_dimension(),
            max_pixels: default_max_pixels(),
            backend: BackendConfigs::default(),
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout.map(Duration::from_secs)
    }

    pub fn upload_timeout(&self) -> Option<Duration> {
        self.upload_timeout.map(Duration::from_secs)
    }

    pub fn output_limits(&self) -> OutputLimits {
        OutputLimits {
            max_dimension: self.max_dimension,
            max_pixels: self.max_pixels,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_dimension() -> u32 {
    OutputLimits::DEFAULT_MAX_DIMENSION
}

fn default_max_pixels() -> u64 {
    OutputLimits::DEFAULT_MAX_PIXELS
}
