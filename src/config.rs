//! Configuration manager for binwise.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::AppState;
use crate::domain::DisposalPolicy;
use crate::domain::session::{DEFAULT_IDLE_TIMEOUT_SECS, MAX_IDLE_TIMEOUT_SECS};
use crate::token::{ACCESS_EXPIRATION_TIME, ORDER_EXPIRATION_TIME};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8888;
const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Longest token lifetime accepted, in seconds.
const MAX_TOKEN_TTL: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Port the HTTP API listens on.
    pub port: Option<u16>,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    #[validate(nested)]
    pub token: Option<Token>,
    /// Disposal rate limits.
    #[serde(default)]
    #[validate(nested)]
    pub policy: DisposalPolicy,
    /// Kiosk stations.
    #[serde(default)]
    #[validate(nested)]
    pub kiosk: Kiosk,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Validate)]
pub struct Token {
    /// Update token audience.
    /// Default is `binwise`.
    pub audience: Option<String>,
    /// Access token lifetime, in seconds.
    #[serde(default = "default_access_ttl")]
    #[validate(range(min = 1, max = MAX_TOKEN_TTL))]
    pub access_ttl: i64,
    /// Order pickup token lifetime, in seconds.
    #[serde(default = "default_order_ttl")]
    #[validate(range(min = 1, max = MAX_TOKEN_TTL))]
    pub order_ttl: i64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            audience: None,
            access_ttl: default_access_ttl(),
            order_ttl: default_order_ttl(),
        }
    }
}

fn default_access_ttl() -> i64 {
    ACCESS_EXPIRATION_TIME
}

fn default_order_ttl() -> i64 {
    ORDER_EXPIRATION_TIME
}

/// Kiosk station configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Kiosk {
    /// Location recorded on disposals made at this station.
    #[validate(length(min = 1, max = 128))]
    pub location: String,
    /// Idle seconds before a normal user is logged out.
    #[validate(range(min = 1, max = MAX_IDLE_TIMEOUT_SECS))]
    pub idle_timeout: i64,
}

impl Default for Kiosk {
    fn default() -> Self {
        Self {
            location: "unknown".to_owned(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                if let Err(err) = config.validate() {
                    return Ok(Arc::new(self.error(err)));
                }

                // set app version.
                config.version = VERSION.to_owned();
                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url)?;
                }

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}
