//! Application configuration loaded from environment variables.

use crate::errors::{IndexerError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC log feed endpoint
    pub rpc_url: String,
    /// The escrow contract address (0x-prefixed, 20 bytes)
    pub contract_address: String,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) to poll the feed for new logs
    pub poll_interval_secs: u64,
    /// Maximum number of logs to fetch per RPC request
    pub logs_per_page: u32,
    /// Block to start from if no cursor is saved
    pub start_block: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let contract_address = lookup("CONTRACT_ADDRESS").ok_or_else(|| {
            IndexerError::Config("CONTRACT_ADDRESS environment variable is required".to_string())
        })?;

        Ok(Config {
            rpc_url: or_default("RPC_URL", "http://localhost:8545"),
            contract_address: validate_address(&contract_address)?,
            database_url: or_default("DATABASE_URL", "sqlite:./gig_index.db"),
            api_port: or_default("API_PORT", "3001")
                .parse()
                .map_err(|_| IndexerError::Config("Invalid API_PORT".to_string()))?,
            poll_interval_secs: or_default("POLL_INTERVAL_SECS", "5")
                .parse()
                .map_err(|_| IndexerError::Config("Invalid POLL_INTERVAL_SECS".to_string()))?,
            logs_per_page: or_default("LOGS_PER_PAGE", "100")
                .parse()
                .map_err(|_| IndexerError::Config("Invalid LOGS_PER_PAGE".to_string()))?,
            start_block: or_default("START_BLOCK", "0")
                .parse()
                .map_err(|_| IndexerError::Config("Invalid START_BLOCK".to_string()))?,
        })
    }
}

fn validate_address(raw: &str) -> Result<String> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    match hex::decode(digits) {
        Ok(bytes) if bytes.len() == 20 => Ok(format!("0x{}", hex::encode(bytes))),
        _ => Err(IndexerError::Config(format!(
            "Invalid CONTRACT_ADDRESS: {raw}"
        ))),
    }
}
