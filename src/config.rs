// Runtime configuration

use crate::core::Network;
use crate::storage::StorageKind;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Settings fixed for the life of the process
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub network: Network,
    pub storage: StorageKind,
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    /// Per-request timeout towards the upstream node
    pub rpc_timeout: Duration,
    /// Target spacing between sync ticks
    pub poll_interval: Duration,
    /// Capacity of the outpoint→addresses cache used by the mempool tracker
    pub address_cache_size: usize,
    /// Events a subscriber may fall behind before it lags
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            network: Network::Bitcoin,
            storage: StorageKind::Sled,
            rpc_url: "http://127.0.0.1:8332".to_string(),
            rpc_user: None,
            rpc_password: None,
            rpc_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(5000),
            address_cache_size: 4096,
            event_capacity: 1024,
        }
    }
}

impl Config {
    /// sled database location
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index")
    }
}

/// Command line flags, each also read from a `CHAIN_INDEXER_*` variable
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Directory holding the index database
    #[arg(long, env = "CHAIN_INDEXER_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Chain to index
    #[arg(long, env = "CHAIN_INDEXER_NETWORK", value_enum, default_value_t = Network::Bitcoin)]
    pub network: Network,

    /// Index storage backend
    #[arg(long, env = "CHAIN_INDEXER_STORAGE", value_enum, default_value_t = StorageKind::Sled)]
    pub storage: StorageKind,

    /// Upstream node JSON-RPC endpoint
    #[arg(long, env = "CHAIN_INDEXER_RPC_URL", default_value = "http://127.0.0.1:8332")]
    pub rpc_url: String,

    #[arg(long, env = "CHAIN_INDEXER_RPC_USER")]
    pub rpc_user: Option<String>,

    #[arg(long, env = "CHAIN_INDEXER_RPC_PASSWORD", hide_env_values = true)]
    pub rpc_password: Option<String>,

    #[arg(long, env = "CHAIN_INDEXER_RPC_TIMEOUT_SECS", default_value_t = 30)]
    pub rpc_timeout_secs: u64,

    /// Milliseconds between sync ticks
    #[arg(long, env = "CHAIN_INDEXER_POLL_INTERVAL_MS", default_value_t = 5000)]
    pub poll_interval_ms: u64,

    #[arg(long, env = "CHAIN_INDEXER_ADDRESS_CACHE_SIZE", default_value_t = 4096)]
    pub address_cache_size: usize,

    #[arg(long, env = "CHAIN_INDEXER_EVENT_CAPACITY", default_value_t = 1024)]
    pub event_capacity: usize,
}

impl From<ConfigArgs> for Config {
    fn from(args: ConfigArgs) -> Self {
        Self {
            data_dir: args.data_dir,
            network: args.network,
            storage: args.storage,
            rpc_url: args.rpc_url,
            rpc_user: args.rpc_user,
            rpc_password: args.rpc_password,
            rpc_timeout: Duration::from_secs(args.rpc_timeout_secs),
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            address_cache_size: args.address_cache_size,
            event_capacity: args.event_capacity,
        }
    }
}
