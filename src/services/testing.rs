//! Test doubles shared by the service-level tests.

use crate::codec;
use crate::constants::FUNCTION_CHANGE_PIXEL_COLOR;
use crate::db::GridStore;
use crate::error::{AppError, Result};
use crate::gateway::{ContractQuery, LogEvent, LogHit, LogSearch, TransactionHit};
use crate::models::{PixelColor, PixelRecord};
use async_trait::async_trait;
use base64::Engine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// In-memory `GridStore` with the same insertion-order and upsert semantics
/// as the Postgres implementation.
pub struct MemoryStore {
    pixels: Mutex<Vec<PixelRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            pixels: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GridStore for MemoryStore {
    async fn all_pixels(&self) -> Result<Vec<PixelRecord>> {
        Ok(self.pixels.lock().await.clone())
    }

    async fn find_pixel(&self, x: u32, y: u32) -> Result<Option<PixelRecord>> {
        Ok(self
            .pixels
            .lock()
            .await
            .iter()
            .find(|p| p.x == x && p.y == y)
            .cloned())
    }

    async fn upsert_pixel(&self, record: &PixelRecord) -> Result<()> {
        let mut pixels = self.pixels.lock().await;
        match pixels.iter_mut().find(|p| p.x == record.x && p.y == record.y) {
            Some(existing) => *existing = record.clone(),
            None => pixels.push(record.clone()),
        }
        Ok(())
    }

    async fn insert_pixels(&self, records: &[PixelRecord]) -> Result<()> {
        self.pixels.lock().await.extend_from_slice(records);
        Ok(())
    }

    async fn clear_pixels(&self) -> Result<()> {
        self.pixels.lock().await.clear();
        Ok(())
    }
}

/// Scripted `ContractQuery` backed by pre-encoded return values.
pub struct MockContract {
    grid_size: u64,
    chunks: HashMap<(u64, u64), Vec<Vec<u8>>>,
    prices: HashMap<u64, u64>,
    delay: Option<std::time::Duration>,
    calls: AtomicUsize,
}

impl MockContract {
    pub fn new(grid_size: u64) -> Self {
        Self {
            grid_size,
            chunks: HashMap::new(),
            prices: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay every call, to keep concurrent callers in flight together.
    pub fn with_query_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_chunk(mut self, x: u64, y: u64, items: Vec<Vec<u8>>) -> Self {
        self.chunks.insert((x, y), items);
        self
    }

    pub fn with_price(mut self, played_count: u64, price: u64) -> Self {
        self.prices.insert(played_count, price);
        self
    }

    /// Number of remote calls that actually reached the mock.
    pub fn query_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContractQuery for MockContract {
    async fn query(&self, endpoint: &str, args: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match endpoint {
            "getPixels" => {
                let x = codec::decode_u64_top_level(&args[0])?;
                let y = codec::decode_u64_top_level(&args[1])?;
                Ok(self.chunks.get(&(x, y)).cloned().unwrap_or_default())
            }
            other => Err(AppError::RemoteQuery(format!(
                "mock has no endpoint {other}"
            ))),
        }
    }

    async fn query_u64(&self, endpoint: &str, args: &[Vec<u8>]) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match endpoint {
            "getGridSize" => Ok(self.grid_size),
            "getPixelPrice" => {
                let played_count = codec::decode_u64_top_level(&args[0])?;
                Ok(self.prices.get(&played_count).copied().unwrap_or(0))
            }
            other => Err(AppError::RemoteQuery(format!(
                "mock has no endpoint {other}"
            ))),
        }
    }
}

/// A transaction plus the log the index would return for it.
pub struct SeededTransaction {
    pub id: String,
    pub timestamp: i64,
    pub event: LogEvent,
}

pub fn encoded_transaction(id: &str, timestamp: i64, event: LogEvent) -> SeededTransaction {
    SeededTransaction {
        id: id.to_string(),
        timestamp,
        event,
    }
}

/// Scripted `LogSearch` returning transactions in the order they were seeded
/// (tests seed newest-first, matching the index sort).
#[derive(Default)]
pub struct MockLogSearch {
    transactions: Vec<SeededTransaction>,
    duplicate_logs: Vec<String>,
    transaction_queries: AtomicUsize,
}

impl MockLogSearch {
    pub fn with_transaction(mut self, transaction: SeededTransaction) -> Self {
        self.transactions.push(transaction);
        self
    }

    /// Make `query_logs` return two hits for `id`, violating the
    /// one-log-per-transaction invariant.
    pub fn with_duplicate_log(mut self, id: &str) -> Self {
        self.duplicate_logs.push(id.to_string());
        self
    }

    pub fn transaction_queries(&self) -> usize {
        self.transaction_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSearch for MockLogSearch {
    async fn query_transactions(&self, _body: &serde_json::Value) -> Result<Vec<TransactionHit>> {
        self.transaction_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .transactions
            .iter()
            .map(|tx| TransactionHit {
                id: tx.id.clone(),
                timestamp: tx.timestamp,
            })
            .collect())
    }

    async fn query_logs(&self, body: &serde_json::Value) -> Result<Vec<LogHit>> {
        let id = body["query"]["bool"]["filter"][0]["match"]["_id"]
            .as_str()
            .unwrap_or_default();

        let mut hits: Vec<LogHit> = self
            .transactions
            .iter()
            .filter(|tx| tx.id == id)
            .map(|tx| LogHit {
                id: tx.id.clone(),
                events: vec![tx.event.clone()],
            })
            .collect();

        if self.duplicate_logs.iter().any(|dup| dup == id) {
            if let Some(first) = hits.first().cloned() {
                hits.push(first);
            }
        }

        Ok(hits)
    }
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn encode_pixel_infos(address: &[u8; 32], color: PixelColor, played_count: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(address);
    bytes.push(color.discriminant());
    bytes.extend_from_slice(&played_count.to_be_bytes());
    bytes
}

/// Top-level encoding of the `Pixel` struct returned by `getPixels`.
pub fn encode_pixel(
    x: u64,
    y: u64,
    address: &[u8; 32],
    color: PixelColor,
    played_count: u64,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&x.to_be_bytes());
    bytes.extend_from_slice(&y.to_be_bytes());
    bytes.extend_from_slice(&encode_pixel_infos(address, color, played_count));
    bytes
}

/// A `changePixelColor` event the way it appears in the log index.
pub fn change_event(
    x: u64,
    y: u64,
    address: &[u8; 32],
    color: PixelColor,
    played_count: u64,
) -> LogEvent {
    let mut coordinates = Vec::new();
    coordinates.extend_from_slice(&x.to_be_bytes());
    coordinates.extend_from_slice(&y.to_be_bytes());

    LogEvent {
        identifier: FUNCTION_CHANGE_PIXEL_COLOR.to_string(),
        topics: vec![
            b64(FUNCTION_CHANGE_PIXEL_COLOR.as_bytes()),
            b64(&coordinates),
        ],
        data: b64(&encode_pixel_infos(address, color, played_count)),
    }
}
