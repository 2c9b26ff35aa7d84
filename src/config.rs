//! # Tool Configuration
//!
//! Settings for talking to the remote service and for local execution are
//! read from an optional JSON file:
//!
//! ```json
//! {
//!   "endpoint": "https://sourcegraph.example.com",
//!   "accessToken": "...",
//!   "cacheDir": "/var/cache/batch-exec",
//!   "parallelism": 4
//! }
//! ```
//!
//! ## Location
//!
//! The file defaults to `$HOME/batch-exec-config.json`. A missing default
//! file is fine and yields the built-in defaults; a file the user asked for
//! explicitly (`--config` or `BATCH_EXEC_CONFIG`) must exist.
//!
//! ## Precedence
//!
//! Command-line flags win over environment variables, which win over the
//! file, which wins over the defaults. The access token can only be
//! overridden through `BATCH_EXEC_ACCESS_TOKEN`.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::executor::default_parallelism;

/// Endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://sourcegraph.com";

/// File name of the default config file in the home directory
pub const CONFIG_FILE_NAME: &str = "batch-exec-config.json";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "BATCH_EXEC_CONFIG";

/// Environment variable overriding the access token
pub const ACCESS_TOKEN_ENV: &str = "BATCH_EXEC_ACCESS_TOKEN";

/// Environment variable overriding the endpoint
pub const ENDPOINT_ENV: &str = "BATCH_EXEC_ENDPOINT";

/// On-disk representation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub endpoint: Option<String>,
    pub access_token: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub parallelism: Option<usize>,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("invalid config file {}: {}", path.display(), e),
        })
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Explicitly requested config file
    pub config_path: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub parallelism: Option<usize>,
}

/// Effective configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Service endpoint without trailing slash
    pub endpoint: String,
    pub access_token: Option<String>,
    pub cache_dir: PathBuf,
    pub parallelism: usize,
    /// File the configuration was read from
    pub source: Option<PathBuf>,
}

/// `$HOME/batch-exec-config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

/// Platform cache directory, falling back to the temp directory
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("batch-exec")
}

/// Validate an endpoint URL and strip trailing slashes
pub fn normalize_endpoint(endpoint: &str) -> Result<String> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let invalid = |reason: String| Error::Usage {
        message: format!("invalid endpoint '{}': {}", endpoint, reason),
    };
    let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(trimmed.to_string())
}

impl Config {
    /// Load the configuration file and apply overrides and environment
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let (file, source) = match &overrides.config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config {
                        message: format!("config file {} does not exist", path.display()),
                    });
                }
                (ConfigFile::from_path(path)?, Some(path.clone()))
            }
            None => match default_config_path() {
                Some(path) if path.exists() => (ConfigFile::from_path(&path)?, Some(path)),
                _ => (ConfigFile::default(), None),
            },
        };
        if let Some(source) = &source {
            debug!("Loaded configuration from {}", source.display());
        }

        let token = std::env::var(ACCESS_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Self::resolve(file, source, overrides, token)
    }

    /// Merge file contents, overrides and the token from the environment
    pub fn resolve(
        file: ConfigFile,
        source: Option<PathBuf>,
        overrides: &ConfigOverrides,
        env_token: Option<String>,
    ) -> Result<Self> {
        let endpoint = overrides
            .endpoint
            .as_deref()
            .or(file.endpoint.as_deref())
            .unwrap_or(DEFAULT_ENDPOINT);

        let parallelism = overrides
            .parallelism
            .or(file.parallelism)
            .unwrap_or_else(default_parallelism);
        if parallelism == 0 {
            return Err(Error::Config {
                message: "parallelism must be at least 1".to_string(),
            });
        }

        Ok(Self {
            endpoint: normalize_endpoint(endpoint)?,
            access_token: env_token.or(file.access_token),
            cache_dir: overrides
                .cache_dir
                .clone()
                .or(file.cache_dir)
                .unwrap_or_else(default_cache_dir),
            parallelism,
            source,
        })
    }
}
