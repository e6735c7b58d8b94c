use super::{LogEvent, LogHit, LogSearch, TransactionHit};
use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct SearchResult<T> {
    hits: SearchHits<T>,
}

#[derive(Deserialize)]
struct SearchHits<T> {
    hits: Vec<SearchHit<T>>,
}

#[derive(Deserialize)]
struct SearchHit<T> {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: T,
}

#[derive(Deserialize)]
struct TransactionSource {
    timestamp: i64,
}

#[derive(Deserialize)]
struct LogSource {
    #[serde(default)]
    events: Vec<LogEvent>,
}

fn transaction_hits(result: SearchResult<TransactionSource>) -> Vec<TransactionHit> {
    result
        .hits
        .hits
        .into_iter()
        .map(|hit| TransactionHit {
            id: hit.id,
            timestamp: hit.source.timestamp,
        })
        .collect()
}

fn log_hits(result: SearchResult<LogSource>) -> Vec<LogHit> {
    result
        .hits
        .hits
        .into_iter()
        .map(|hit| LogHit {
            id: hit.id,
            events: hit.source.events,
        })
        .collect()
}

/// Search client for the chain indexer (Elasticsearch wire format).
pub struct ElasticClient {
    http: reqwest::Client,
    base_url: String,
}

impl ElasticClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.query_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            base_url: config.elastic_url.trim_end_matches('/').to_string(),
        })
    }

    async fn search<T: serde::de::DeserializeOwned>(
        &self,
        index: &str,
        body: &serde_json::Value,
    ) -> Result<SearchResult<T>> {
        let url = format!("{}/{}/_search", self.base_url, index);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::RemoteQuery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::RemoteQuery(format!(
                "search on {index} returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::RemoteQuery(e.to_string()))
    }
}

#[async_trait]
impl LogSearch for ElasticClient {
    async fn query_transactions(&self, body: &serde_json::Value) -> Result<Vec<TransactionHit>> {
        let result = self.search::<TransactionSource>("transactions", body).await?;
        Ok(transaction_hits(result))
    }

    async fn query_logs(&self, body: &serde_json::Value) -> Result<Vec<LogHit>> {
        let result = self.search::<LogSource>("logs", body).await?;
        Ok(log_hits(result))
    }
}
