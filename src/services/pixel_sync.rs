use super::pixel_service::{coordinate, pixel_infos_from_value, PixelService};
use crate::abi::{AbiRegistry, AbiType};
use crate::codec;
use crate::config::Config;
use crate::constants::{FUNCTION_CHANGE_PIXEL_COLOR, STRUCT_PIXEL_INFOS};
use crate::error::{AppError, Result};
use crate::gateway::{LogEvent, LogSearch};
use crate::models::PixelRecord;
use base64::Engine;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

fn transactions_filter(contract_address: &str, since: i64) -> serde_json::Value {
    serde_json::json!({
        "sort": [
            { "timestamp": "desc" }
        ],
        "query": {
            "bool": {
                "filter": [
                    {
                        "range": {
                            "timestamp": {
                                "gt": since,
                                "lte": "now"
                            }
                        }
                    },
                    {
                        "match": {
                            "receiver": contract_address
                        }
                    },
                    {
                        "match": {
                            "function": FUNCTION_CHANGE_PIXEL_COLOR
                        }
                    }
                ]
            }
        }
    })
}

fn logs_filter(transaction_id: &str) -> serde_json::Value {
    serde_json::json!({
        "sort": [
            { "timestamp": "desc" }
        ],
        "query": {
            "bool": {
                "filter": [
                    {
                        "match": {
                            "_id": transaction_id
                        }
                    }
                ]
            }
        }
    })
}

fn decode_topic(topic: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(topic)
        .map_err(|e| AppError::Decode(format!("invalid base64 event payload: {e}")))
}

/// Timer-driven reconciler. Reads the watermark, pulls `changePixelColor`
/// transactions newer than it from the log index, decodes each event into a
/// cell state and applies the batch as upserts. The watermark only advances
/// after the whole batch lands.
pub struct PixelSyncJob {
    service: Arc<PixelService>,
    logs: Arc<dyn LogSearch>,
    registry: Arc<AbiRegistry>,
    contract_address: String,
    interval_secs: u64,
}

impl PixelSyncJob {
    pub fn new(
        service: Arc<PixelService>,
        logs: Arc<dyn LogSearch>,
        registry: Arc<AbiRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            service,
            logs,
            registry,
            contract_address: config.contract_address.clone(),
            interval_secs: config.sync_interval_secs,
        }
    }

    /// Start the sync loop. A tick that fires while a pass is still running
    /// is delayed, so passes never overlap.
    pub async fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.refresh_latest_pixels().await {
                    Ok(0) => tracing::debug!("No pixel to update"),
                    Ok(count) => tracing::info!("Applied {} pixel updates", count),
                    Err(e) => tracing::error!("Pixel sync pass failed: {}", e),
                }
            }
        });
    }

    /// One incremental pass. Returns the number of applied updates.
    pub async fn refresh_latest_pixels(&self) -> Result<usize> {
        // Cold start is the full-refresh path, not ours.
        let Some(watermark) = self.service.watermark().await else {
            return Ok(0);
        };

        let transactions = self
            .logs
            .query_transactions(&transactions_filter(&self.contract_address, watermark))
            .await?;
        if transactions.is_empty() {
            return Ok(0);
        }

        // Captured before processing so the new watermark only ever covers
        // transactions this pass is about to apply.
        let latest_timestamp = transactions
            .iter()
            .map(|tx| tx.timestamp)
            .max()
            .unwrap_or(watermark);

        let mut updates = Vec::with_capacity(transactions.len());
        for transaction in &transactions {
            let hits = self.logs.query_logs(&logs_filter(&transaction.id)).await?;
            if hits.len() != 1 {
                return Err(AppError::InvariantViolation(format!(
                    "expected exactly one log for transaction {}, got {}",
                    transaction.id,
                    hits.len()
                )));
            }

            let event = hits[0]
                .events
                .iter()
                .find(|event| event.identifier == FUNCTION_CHANGE_PIXEL_COLOR)
                .ok_or_else(|| {
                    AppError::InvariantViolation(format!(
                        "transaction {} log has no {FUNCTION_CHANGE_PIXEL_COLOR} event",
                        transaction.id
                    ))
                })?;

            updates.push((transaction.timestamp, self.decode_event(event)?));
        }

        // Ascending apply order: the chronologically latest state wins when
        // one pass touches the same cell twice.
        updates.sort_by_key(|(timestamp, _)| *timestamp);
        let records: Vec<PixelRecord> = updates.into_iter().map(|(_, record)| record).collect();

        self.service.apply_pixel_updates(&records).await?;
        self.service.set_watermark(latest_timestamp).await?;

        Ok(records.len())
    }

    fn decode_event(&self, event: &LogEvent) -> Result<PixelRecord> {
        let topic = event.topics.get(1).ok_or_else(|| {
            AppError::InvariantViolation(
                "change event is missing its coordinates topic".to_string(),
            )
        })?;

        let coordinates_ty = AbiType::Tuple(vec![AbiType::U64, AbiType::U64]);
        let coordinates =
            codec::decode_top_level(&decode_topic(topic)?, &coordinates_ty, &self.registry)?;
        let (x, y) = match coordinates.items()? {
            [x, y] => (coordinate(x.as_u64()?)?, coordinate(y.as_u64()?)?),
            other => {
                return Err(AppError::Decode(format!(
                    "expected coordinate pair, got {} items",
                    other.len()
                )))
            }
        };

        let infos_ty = AbiType::Named(STRUCT_PIXEL_INFOS.to_string());
        let infos =
            codec::decode_top_level(&decode_topic(&event.data)?, &infos_ty, &self.registry)?;
        let (address, color, played_count) = pixel_infos_from_value(&infos)?;

        Ok(PixelRecord {
            x,
            y,
            address,
            color,
            played_count,
        })
    }
}
