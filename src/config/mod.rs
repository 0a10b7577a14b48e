use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::events::{ContractRegistry, ContractSpec, ContractStandard};

const CONFIG_PATH_VAR: &str = "GOVERNANCE_INDEXER_CONFIG";
const CONFIG_ENV_VAR: &str = "GOVERNANCE_INDEXER_ENV";
const ENV_PREFIX: &str = "GOVERNANCE_INDEXER";

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerSettings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub endpoint: EndpointConfig,
    #[serde(alias = "indexlog", alias = "indexLog")]
    pub index_log: IndexLogConfig,
    pub indexer: IndexerConfig,
    /// Downstream service notified out of band; only logged here.
    #[serde(default)]
    pub gateway: Option<String>,
}

impl IndexerSettings {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "config/indexer.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var(CONFIG_ENV_VAR) {
            if !env_override.is_empty() {
                let env_file = format!("config/indexer.{env_override}.toml");
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("endpoint.rpcs"),
        );

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        Self::from_config(settings)
    }

    fn from_config(settings: Config) -> Result<Self> {
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize indexer configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        assert!(
            self.database.max_connections >= self.database.min_connections.unwrap_or(1),
            "Max connections must be >= min connections"
        );
        self.endpoint.ensure_bounds()?;
        self.indexer.ensure_bounds()?;
        self.index_log.registry()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

/// Chain the logs are read from. `id` is the expected `eth_chainId`.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub id: u64,
    pub rpcs: Vec<String>,
}

impl EndpointConfig {
    fn ensure_bounds(&self) -> Result<()> {
        anyhow::ensure!(!self.rpcs.is_empty(), "At least one RPC endpoint must be configured");
        anyhow::ensure!(
            self.rpcs.iter().all(|url| url.starts_with("http://") || url.starts_with("https://")),
            "RPC endpoints must be http(s) URLs"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexLogConfig {
    #[serde(alias = "startblock", alias = "startBlock", default)]
    pub start_block: u64,
    pub contracts: Vec<ContractConfig>,
}

impl IndexLogConfig {
    /// Resolves every contract's standard once.
    pub fn registry(&self) -> Result<ContractRegistry> {
        anyhow::ensure!(!self.contracts.is_empty(), "At least one contract must be configured");
        let specs = self
            .contracts
            .iter()
            .map(|contract| -> Result<ContractSpec> {
                Ok(ContractSpec {
                    name: contract.name.clone(),
                    address: contract.address.clone(),
                    standard: ContractStandard::parse(contract.standard.as_deref())
                        .with_context(|| format!("Contract {}", contract.name))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ContractRegistry::new(specs)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub standard: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    pub poll_interval_ms: u64,
    pub batch_size: u64,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default = "IndexerConfig::default_reorg_depth")]
    pub reorg_depth: u64,
    #[serde(default = "IndexerConfig::default_max_ranges_per_tick")]
    pub max_ranges_per_tick: u64,
    #[serde(default = "IndexerConfig::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "IndexerConfig::default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    pub request_timeout_ms: Option<u64>,
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        assert!(
            self.poll_interval_ms >= 100,
            "Poll interval must be >= 100ms"
        );
        assert!(
            self.poll_interval_ms <= 60_000,
            "Poll interval must be <= 60 seconds"
        );
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(10_000);
        assert!(millis >= 100, "RPC timeout must be at least 100ms");
        assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }

    pub fn ensure_bounds(&self) -> Result<()> {
        assert!(self.batch_size > 0, "Batch size must be positive");
        assert!(self.batch_size <= 10_000, "Batch size exceeds defensive limit");
        assert!(self.reorg_depth <= 1_024, "Reorg depth exceeds defensive limit");
        assert!(self.max_ranges_per_tick > 0, "At least one range per tick is required");
        assert!(self.max_retries > 0, "At least one attempt is required");
        assert!(
            self.retry_base_delay_ms <= 60_000,
            "Retry base delay cannot exceed 60 seconds"
        );
        Ok(())
    }

    const fn default_reorg_depth() -> u64 {
        64
    }

    const fn default_max_ranges_per_tick() -> u64 {
        16
    }

    const fn default_max_retries() -> u32 {
        5
    }

    const fn default_retry_base_delay_ms() -> u64 {
        500
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
