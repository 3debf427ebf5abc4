//! Server configuration
//!
//! Loaded with figment from a TOML file (keys under a `[global]` table) and
//! `MATRIXON_` prefixed environment variables. Nested tables are reached with
//! a double underscore, e.g. `MATRIXON_DATABASE__URL` or
//! `MATRIXON_RELATIONS__MAX_LIMIT`. Environment variables win over the file.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use matrixon_common::{MatrixonError, Result};
use matrixon_db::DatabaseConfig;
use ruma::{OwnedServerName, OwnedUserId};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub server_name: OwnedServerName,
    #[serde(default = "default_address")]
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log")]
    pub log: String,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub relations: RelationsConfig,
    #[serde(default)]
    pub access_tokens: Vec<AccessTokenConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Page size defaults for the relation queries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct RelationsConfig {
    #[serde(default = "default_relations_limit")]
    pub default_limit: u32,
    #[serde(default = "default_relations_max_limit")]
    pub max_limit: u32,
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_relations_limit(),
            max_limit: default_relations_max_limit(),
        }
    }
}

impl RelationsConfig {
    /// The page size to use for a client supplied `limit`
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

/// A statically configured access token
#[derive(Clone, Deserialize)]
pub struct AccessTokenConfig {
    pub user_id: OwnedUserId,
    pub token: String,
}

impl fmt::Debug for AccessTokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenConfig")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Prometheus exporter settings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

impl Config {
    /// The provider chain: optional TOML file, then the environment
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path).nested());
        }
        figment.merge(Env::prefixed("MATRIXON_").split("__").global())
    }

    /// Extract and validate the configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        debug!("🔧 Loading configuration from {:?}", path);

        let config: Config = Self::figment(path)
            .extract()
            .map_err(|e| MatrixonError::Config(e.to_string()))?;
        config.validate()?;

        info!("✅ Configuration loaded for {}", config.server_name);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let RelationsConfig {
            default_limit,
            max_limit,
        } = self.relations;

        if default_limit == 0 || max_limit == 0 {
            return Err(MatrixonError::Config(
                "relations limits must be at least 1".to_owned(),
            ));
        }
        if default_limit > max_limit {
            return Err(MatrixonError::Config(format!(
                "relations.default_limit ({default_limit}) exceeds relations.max_limit ({max_limit})"
            )));
        }
        if self.database.max_connections == 0 {
            return Err(MatrixonError::Config(
                "database.max_connections must be at least 1".to_owned(),
            ));
        }
        if self.access_tokens.is_empty() {
            warn!("⚠️ No access tokens configured, every request will be rejected");
        }

        Ok(())
    }

    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

fn default_address() -> IpAddr {
    Ipv4Addr::LOCALHOST.into()
}

fn default_port() -> u16 {
    8008
}

fn default_log() -> String {
    "warn,matrixon_relations=info,matrixon_db=info".to_owned()
}

fn default_max_request_size() -> usize {
    1024 * 1024
}

fn default_relations_limit() -> u32 {
    5
}

fn default_relations_max_limit() -> u32 {
    100
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 9090)
}
