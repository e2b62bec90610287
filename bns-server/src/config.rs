use {
    std::{net::{IpAddr, Ipv4Addr}, path::PathBuf, thread::available_parallelism},
    tokio::{fs, io},
    serde::Deserialize,
    thiserror::Error,
    bns_core::DEFAULT_VAR_NAME,
    crate::store::{StoreLocation, IN_MEMORY},
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/bns.yaml";

#[derive(Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct ServerConfig {
    #[serde(skip_deserializing)]
    pub config_path: Option<PathBuf>,

    #[serde(alias = "pidfile")]
    pub pid_file: Option<PathBuf>,

    /// Path to the sqlite database, or `:memory:`.
    #[serde(alias = "dbpath")]
    pub db_path: String,

    #[serde(default = "default_host")]
    pub host: IpAddr,

    pub port: u16,

    /// Variable name printed in front of the build number.
    #[serde(alias = "varname", default = "default_var_name")]
    pub var_name: String,

    pub pool_size: Option<usize>,

    /// Prometheus metrics are only served when this is set.
    pub metrics_port: Option<u16>,
}

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0:?}")]
    FailedToRead(io::Error),

    #[error("failed to parse config: {0}")]
    FailedToParse(serde_yml::Error),
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_var_name() -> String {
    DEFAULT_VAR_NAME.to_owned()
}

impl ServerConfig {
    pub async fn load(file_path: PathBuf) -> Result<Self, ConfigLoadError> {
        let mut config: Self = serde_yml::from_slice(
            &fs::read(&file_path).await.map_err(ConfigLoadError::FailedToRead)?
        ).map_err(ConfigLoadError::FailedToParse)?;
        config.config_path = Some(file_path);
        Ok(config)
    }

    pub fn from_yaml(config: &str) -> Result<Self, ConfigLoadError> {
        serde_yml::from_str(config).map_err(ConfigLoadError::FailedToParse)
    }

    /// In-memory store on an ephemeral localhost port, without pid file or metrics.
    pub fn in_memory() -> Self {
        Self {
            config_path: None,
            pid_file: None,
            db_path: IN_MEMORY.to_owned(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            var_name: default_var_name(),
            pool_size: None,
            metrics_port: None,
        }
    }

    pub fn with_db_path(mut self, db_path: impl Into<String>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn with_var_name(mut self, var_name: impl Into<String>) -> Self {
        self.var_name = var_name.into();
        self
    }

    pub fn with_metrics_port(mut self, metrics_port: u16) -> Self {
        self.metrics_port = Some(metrics_port);
        self
    }

    pub fn store_location(&self) -> StoreLocation {
        StoreLocation::parse(&self.db_path)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
            .or_else(|| available_parallelism().ok().map(|v| v.get()))
            .unwrap_or(1)
            .max(1)
    }
}
