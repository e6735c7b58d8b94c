use super::ContractQuery;
use crate::abi::AbiRegistry;
use crate::codec;
use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct VmQueryRequest<'a> {
    #[serde(rename = "scAddress")]
    sc_address: &'a str,
    #[serde(rename = "funcName")]
    func_name: &'a str,
    args: Vec<String>,
}

#[derive(Deserialize)]
struct GatewayEnvelope {
    data: GatewayData,
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
struct GatewayData {
    data: VmOutput,
}

#[derive(Deserialize)]
struct VmOutput {
    #[serde(rename = "returnData", default)]
    return_data: Vec<String>,
    #[serde(rename = "returnCode", default)]
    return_code: String,
    #[serde(rename = "returnMessage", default)]
    return_message: String,
}

fn decode_return_data(output: VmOutput) -> Result<Vec<Vec<u8>>> {
    if output.return_code != "ok" {
        return Err(AppError::RemoteQuery(format!(
            "contract returned {}: {}",
            output.return_code, output.return_message
        )));
    }

    output
        .return_data
        .iter()
        .map(|item| {
            base64::engine::general_purpose::STANDARD
                .decode(item)
                .map_err(|e| AppError::Decode(format!("invalid base64 return data: {e}")))
        })
        .collect()
}

/// VM query client against the MultiversX gateway. Every call is checked
/// against the ABI registry before it goes on the wire.
pub struct VmQueryClient {
    http: reqwest::Client,
    gateway_url: String,
    contract_address: String,
    registry: Arc<AbiRegistry>,
}

impl VmQueryClient {
    pub fn new(config: &Config, registry: Arc<AbiRegistry>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.query_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            contract_address: config.contract_address.clone(),
            registry,
        })
    }

    async fn execute(&self, request: &VmQueryRequest<'_>) -> Result<Vec<Vec<u8>>> {
        let url = format!("{}/vm-values/query", self.gateway_url);

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::RemoteQuery(e.to_string()))?;

        let envelope: GatewayEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::RemoteQuery(e.to_string()))?;

        if !envelope.error.is_empty() {
            return Err(AppError::RemoteQuery(format!(
                "gateway error ({}): {}",
                envelope.code, envelope.error
            )));
        }

        decode_return_data(envelope.data.data)
    }
}

#[async_trait]
impl ContractQuery for VmQueryClient {
    async fn query(&self, endpoint: &str, args: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        self.registry.endpoint(endpoint)?;

        let request = VmQueryRequest {
            sc_address: &self.contract_address,
            func_name: endpoint,
            args: args.iter().map(hex::encode).collect(),
        };

        // One immediate retry on failure; the second failure is surfaced.
        match self.execute(&request).await {
            Ok(values) => Ok(values),
            Err(first) => {
                tracing::warn!("query {} failed, retrying once: {}", endpoint, first);
                self.execute(&request).await
            }
        }
    }

    async fn query_u64(&self, endpoint: &str, args: &[Vec<u8>]) -> Result<u64> {
        let values = self.query(endpoint, args).await?;
        let first = values
            .first()
            .ok_or_else(|| AppError::Decode(format!("endpoint {endpoint} returned no value")))?;
        codec::decode_u64_top_level(first)
    }
}
