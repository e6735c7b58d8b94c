pub mod elastic;
pub mod vm_query;

pub use elastic::ElasticClient;
pub use vm_query::VmQueryClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Read-only contract calls, keyed by ABI endpoint name. Arguments and
/// results are top-level encoded byte buffers.
#[async_trait]
pub trait ContractQuery: Send + Sync {
    async fn query(&self, endpoint: &str, args: &[Vec<u8>]) -> Result<Vec<Vec<u8>>>;

    /// Convenience for scalar-returning endpoints.
    async fn query_u64(&self, endpoint: &str, args: &[Vec<u8>]) -> Result<u64>;
}

/// Indexed transaction and event-log search.
#[async_trait]
pub trait LogSearch: Send + Sync {
    async fn query_transactions(&self, body: &serde_json::Value) -> Result<Vec<TransactionHit>>;
    async fn query_logs(&self, body: &serde_json::Value) -> Result<Vec<LogHit>>;
}

#[derive(Debug, Clone)]
pub struct TransactionHit {
    pub id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct LogHit {
    pub id: String,
    pub events: Vec<LogEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogEvent {
    pub identifier: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}
