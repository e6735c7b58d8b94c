use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_REFRESH_CONCURRENCY,
    SYNC_INTERVAL_SECS,
};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // MultiversX
    pub gateway_url: String,
    pub elastic_url: String,
    pub contract_address: String,

    // Grid scan
    pub chunk_size: u32,
    pub refresh_concurrency: usize,

    // Sync
    pub sync_interval_secs: u64,

    // Remote calls
    pub query_timeout_secs: u64,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            gateway_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "https://devnet-gateway.multiversx.com".to_string()),
            elastic_url: env::var("ELASTIC_URL")
                .unwrap_or_else(|_| "https://devnet-index.multiversx.com".to_string()),
            contract_address: env::var("CONTRACT_ADDRESS")?,

            chunk_size: env::var("CHUNK_SIZE")
                .unwrap_or_else(|_| DEFAULT_CHUNK_SIZE.to_string())
                .parse()?,
            refresh_concurrency: env::var("REFRESH_CONCURRENCY")
                .unwrap_or_else(|_| DEFAULT_REFRESH_CONCURRENCY.to_string())
                .parse()?,

            sync_interval_secs: env::var("SYNC_INTERVAL_SECS")
                .unwrap_or_else(|_| SYNC_INTERVAL_SECS.to_string())
                .parse()?,

            query_timeout_secs: env::var("QUERY_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_QUERY_TIMEOUT_SECS.to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.gateway_url.trim().is_empty() {
            anyhow::bail!("GATEWAY_URL is empty");
        }
        if self.elastic_url.trim().is_empty() {
            anyhow::bail!("ELASTIC_URL is empty");
        }
        if !self.contract_address.starts_with("erd1") {
            anyhow::bail!("CONTRACT_ADDRESS is not a bech32 contract address");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("CHUNK_SIZE must be > 0");
        }
        if self.refresh_concurrency == 0 {
            anyhow::bail!("REFRESH_CONCURRENCY must be > 0");
        }
        if self.sync_interval_secs == 0 {
            anyhow::bail!("SYNC_INTERVAL_SECS must be > 0");
        }

        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_testnet(&self) -> bool {
        if self.environment == "development" || self.environment == "testnet" {
            return true;
        }
        self.gateway_url.contains("devnet") || self.gateway_url.contains("testnet")
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "0.0.0.0".to_string(),
        port: 3000,
        environment: "development".to_string(),
        database_url: "postgres://localhost/xplace".to_string(),
        database_max_connections: 1,
        gateway_url: "http://localhost:8079".to_string(),
        elastic_url: "http://localhost:9200".to_string(),
        contract_address: "erd1qqqqqqqqqqqqqpgq590zplleun0rdtts7kh5pk4cpjmuyaxdvl0s5jzxjl"
            .to_string(),
        chunk_size: 10,
        refresh_concurrency: 2,
        sync_interval_secs: 6,
        query_timeout_secs: 5,
        cors_allowed_origins: "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_non_bech32_contract_address() {
        // Memastikan alamat kontrak tanpa prefix erd1 ditolak
        let mut config = test_config();
        config.contract_address = "0xabc".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_chunk_size() {
        let mut config = test_config();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn is_testnet_detects_devnet_gateway() {
        let mut config = test_config();
        config.environment = "production".to_string();
        config.gateway_url = "https://devnet-gateway.multiversx.com".to_string();
        assert!(config.is_testnet());

        config.gateway_url = "https://gateway.multiversx.com".to_string();
        assert!(!config.is_testnet());
    }
}
