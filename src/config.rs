use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::chain::gas::GasType;
use crate::core_types::Chain;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    pub network: NetworkConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub events: EventsConfig,
    /// JSON-RPC provider; the simulated provider is used when absent
    #[serde(default)]
    pub rpc: Option<RpcConfig>,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
    #[serde(default)]
    pub poi_node_urls: Vec<String>,
}

fn default_artifacts_dir() -> String {
    "./artifacts".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Engine network name, e.g. "Ethereum"
    pub name: String,
    pub chain_id: u64,
    pub gas_type: GasType,
}

impl NetworkConfig {
    pub fn chain(&self) -> Chain {
        Chain::evm(self.chain_id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AggregatorConfig {
    pub quiescence_window_ms: u64,
    /// Hard upper bound on one aggregation; must exceed the quiescence window
    pub ceiling_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            quiescence_window_ms: 5_000,
            ceiling_ms: 60_000,
        }
    }
}

impl AggregatorConfig {
    pub fn quiescence_window(&self) -> Duration {
        Duration::from_millis(self.quiescence_window_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    pub confirm_timeout_ms: u64,
    pub gas_limit_buffer_percent: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    /// ERC-20 sent by the `transfer` command (WETH on mainnet)
    pub token_address: String,
    /// Human-readable amount, scaled by `token_decimals`
    pub amount: String,
    pub token_decimals: u32,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default = "default_show_sender_address")]
    pub show_sender_address_to_recipient: bool,
}

fn default_show_sender_address() -> bool {
    true
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: 600_000,
            gas_limit_buffer_percent: 20,
            retry: RetryConfig::default(),
            token_address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(),
            amount: "0.01".to_string(),
            token_decimals: 18,
            memo: Some("Railgun Demo Transfer".to_string()),
            show_sender_address_to_recipient: true,
        }
    }
}

impl TransferConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventsConfig {
    /// Per-subscriber queue bound
    pub queue_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcConfig {
    pub url: String,
    /// Node-managed account used for `eth_sendTransaction`
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregator.ceiling_ms <= self.aggregator.quiescence_window_ms {
            return Err(ConfigError::Invalid {
                field: "aggregator.ceiling_ms",
                reason: "must exceed quiescence_window_ms".to_string(),
            });
        }
        if self.events.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "events.queue_capacity",
                reason: "must be positive".to_string(),
            });
        }
        if self.transfer.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "transfer.retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// 32-byte engine encryption key as 64 hex characters.
///
/// Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    /// Use `raw` directly when it is already 64 hex chars, otherwise derive
    /// the key as hex SHA-256 of the passphrase.
    pub fn from_passphrase_or_hex(raw: &str) -> Self {
        let is_hex_key = raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit());
        if is_hex_key {
            Self(raw.to_string())
        } else {
            Self(hex::encode(Sha256::digest(raw.as_bytes())))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Secrets and per-run parameters read from the environment (`.env` honored)
#[derive(Clone)]
pub struct Credentials {
    pub mnemonic: String,
    pub encryption_key: EncryptionKey,
    pub rpc_url: String,
    /// Shielded recipient; only the `transfer` command needs it
    pub target_address: Option<String>,
    pub creation_block: u64,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mnemonic", &"<redacted>")
            .field("encryption_key", &self.encryption_key)
            .field("rpc_url", &self.rpc_url)
            .field("target_address", &self.target_address)
            .field("creation_block", &self.creation_block)
            .finish()
    }
}

impl Credentials {
    /// Build from a variable source (`std::env::var` in the binary)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };

        let mnemonic = required("MNEMONIC")?;
        let encryption_key = EncryptionKey::from_passphrase_or_hex(&required("ENCRYPTION_KEY")?);
        let rpc_url = required("RPC_URL")?;
        let target_address = lookup("TARGET_0ZK_ADDRESS").filter(|v| !v.is_empty());
        let creation_block = match lookup("CREATION_BLOCK") {
            Some(v) if !v.is_empty() => v.parse().map_err(|e| ConfigError::Invalid {
                field: "CREATION_BLOCK",
                reason: format!("{}", e),
            })?,
            _ => 0,
        };

        Ok(Self {
            mnemonic,
            encryption_key,
            rpc_url,
            target_address,
            creation_block,
        })
    }
}
