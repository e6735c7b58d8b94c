use crate::abi::{AbiRegistry, AbiType};
use crate::cache::Cache;
use crate::codec::{self, TypedValue};
use crate::config::Config;
use crate::constants::{
    CACHE_KEY_GRID_SIZE, CACHE_KEY_LAST_PIXEL_UPDATE, ENDPOINT_GET_GRID_SIZE, ENDPOINT_GET_PIXELS,
    ENDPOINT_GET_PIXEL_PRICE, GRID_SIZE_TTL_SECS, PIXELS_CHUNK_TTL_SECS, PIXEL_PRICE_TTL_SECS,
    STRUCT_PIXEL, WATERMARK_TTL_SECS,
};
use crate::db::GridStore;
use crate::error::{AppError, Result};
use crate::gateway::ContractQuery;
use crate::models::{
    AvailableColorResponse, PixelColor, PixelConfigResponse, PixelInfosResponse, PixelRecord,
};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

/// One rectangle of the scan plan. Interior chunks are square; chunks on the
/// right and bottom edges are clipped to the grid boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridChunk {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl GridChunk {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Partition `[0, grid_size)²` into row-major chunks covering every
/// coordinate exactly once.
pub fn chunk_plan(grid_size: u32, chunk_size: u32) -> Vec<GridChunk> {
    let mut chunks = Vec::new();
    let mut y = 0;
    while y < grid_size {
        let height = chunk_size.min(grid_size - y);
        let mut x = 0;
        while x < grid_size {
            let width = chunk_size.min(grid_size - x);
            chunks.push(GridChunk {
                x,
                y,
                width,
                height,
            });
            x += chunk_size;
        }
        y += chunk_size;
    }
    chunks
}

/// Read-side service over the materialized grid view. Every remote lookup
/// goes through the single-flight cache.
pub struct PixelService {
    store: Arc<dyn GridStore>,
    cache: Arc<Cache>,
    contract: Arc<dyn ContractQuery>,
    registry: Arc<AbiRegistry>,
    chunk_size: u32,
    refresh_concurrency: usize,
    refresh_mutex: Mutex<()>,
}

impl PixelService {
    pub fn new(
        store: Arc<dyn GridStore>,
        cache: Arc<Cache>,
        contract: Arc<dyn ContractQuery>,
        registry: Arc<AbiRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            cache,
            contract,
            registry,
            chunk_size: config.chunk_size,
            refresh_concurrency: config.refresh_concurrency,
            refresh_mutex: Mutex::new(()),
        }
    }

    /// The full grid. A missing watermark means the view was never built
    /// (or was explicitly evicted) and triggers a cold-start refresh.
    pub async fn get_all_pixels(&self) -> Result<Vec<PixelRecord>> {
        match self.watermark().await {
            Some(_) => self.store.all_pixels().await,
            None => self.refresh_all_pixels().await,
        }
    }

    /// Cold-start bulk load: wipe the store, scan the whole grid chunk by
    /// chunk, then record the watermark. The watermark carries the pass
    /// *start* time so events landing mid-scan are picked up by the next
    /// incremental pass.
    pub async fn refresh_all_pixels(&self) -> Result<Vec<PixelRecord>> {
        // One pass at a time; whoever waited here re-checks the watermark
        // because the pass that just finished usually wrote it.
        let _pass = self.refresh_mutex.lock().await;
        if self.watermark().await.is_some() {
            return self.store.all_pixels().await;
        }

        tracing::info!("Starting full grid refresh");
        self.store.clear_pixels().await?;

        let pass_started_at = chrono::Utc::now().timestamp();
        let grid_size = self.grid_size().await?;
        let grid_size = u32::try_from(grid_size)
            .map_err(|_| AppError::Decode(format!("grid size {grid_size} out of range")))?;

        let chunks = chunk_plan(grid_size, self.chunk_size);
        let mut fetches = stream::iter(chunks.into_iter().map(|chunk| self.fetch_chunk(chunk)))
            .buffered(self.refresh_concurrency);

        let mut pixels = Vec::new();
        while let Some(batch) = fetches.next().await {
            pixels.extend(batch?);
        }

        self.store.insert_pixels(&pixels).await?;
        self.set_watermark(pass_started_at).await?;

        tracing::info!("Full refresh loaded {} pixels", pixels.len());
        Ok(pixels)
    }

    async fn fetch_chunk(&self, chunk: GridChunk) -> Result<Vec<PixelRecord>> {
        let pixels = self.pixels_chunk(chunk.x, chunk.y).await?;
        tracing::debug!("Fetched chunk x: {}, y: {}", chunk.x, chunk.y);
        // The contract clips the queried square at the boundary; filtering to
        // the planned rectangle keeps coverage exactly-once regardless.
        Ok(pixels
            .into_iter()
            .filter(|pixel| chunk.contains(pixel.x, pixel.y))
            .collect())
    }

    async fn pixels_chunk(&self, x: u32, y: u32) -> Result<Vec<PixelRecord>> {
        let key = format!("pixels-{x}-{y}-{}", self.chunk_size);
        self.cache
            .get_or_compute(&key, Duration::from_secs(PIXELS_CHUNK_TTL_SECS), || {
                self.pixels_chunk_raw(x, y)
            })
            .await
    }

    async fn pixels_chunk_raw(&self, x: u32, y: u32) -> Result<Vec<PixelRecord>> {
        let args = [
            codec::encode_u64_top_level(u64::from(x)),
            codec::encode_u64_top_level(u64::from(y)),
            codec::encode_u64_top_level(u64::from(self.chunk_size)),
        ];
        let items = self.contract.query(ENDPOINT_GET_PIXELS, &args).await?;

        let ty = AbiType::Named(STRUCT_PIXEL.to_string());
        items
            .iter()
            .map(|bytes| {
                let value = codec::decode_top_level(bytes, &ty, &self.registry)?;
                pixel_from_value(&value)
            })
            .collect()
    }

    pub async fn grid_size(&self) -> Result<u64> {
        self.cache
            .get_or_compute(
                CACHE_KEY_GRID_SIZE,
                Duration::from_secs(GRID_SIZE_TTL_SECS),
                || async { self.contract.query_u64(ENDPOINT_GET_GRID_SIZE, &[]).await },
            )
            .await
    }

    pub async fn price_to_change(&self, played_count: u32) -> Result<u64> {
        let key = format!("pixel-price-{played_count}");
        self.cache
            .get_or_compute(&key, Duration::from_secs(PIXEL_PRICE_TTL_SECS), || async move {
                self.contract
                    .query_u64(
                        ENDPOINT_GET_PIXEL_PRICE,
                        &[codec::encode_u64_top_level(u64::from(played_count))],
                    )
                    .await
            })
            .await
    }

    pub async fn get_pixel_infos(&self, x: u32, y: u32) -> Result<PixelInfosResponse> {
        if !self.coordinates_in_bounds(x, y).await? {
            return Err(AppError::BadRequest(
                "Invalid coordinates: out of bounds".to_string(),
            ));
        }

        let price_to_change = match self.store.find_pixel(x, y).await? {
            Some(record) => self.price_to_change(record.played_count).await?.to_string(),
            None => "0".to_string(),
        };

        Ok(PixelInfosResponse {
            x,
            y,
            price_to_change,
        })
    }

    pub fn get_pixel_config(&self) -> PixelConfigResponse {
        PixelConfigResponse {
            available_colors: PixelColor::ALL
                .into_iter()
                .map(|color| AvailableColorResponse {
                    color_hex: color.hex().to_string(),
                    discriminant: color.discriminant(),
                })
                .collect(),
        }
    }

    async fn coordinates_in_bounds(&self, x: u32, y: u32) -> Result<bool> {
        let grid_size = self.grid_size().await?;
        Ok(u64::from(x) < grid_size && u64::from(y) < grid_size)
    }

    /// Apply a batch of decoded cell states. Callers are expected to order
    /// the batch so the chronologically latest state per coordinate wins.
    pub async fn apply_pixel_updates(&self, updates: &[PixelRecord]) -> Result<()> {
        for record in updates {
            self.store.upsert_pixel(record).await?;
        }
        Ok(())
    }

    pub async fn find_pixel(&self, x: u32, y: u32) -> Result<Option<PixelRecord>> {
        self.store.find_pixel(x, y).await
    }

    /// The sync watermark, or `None` on a cold start.
    pub async fn watermark(&self) -> Option<i64> {
        self.cache.peek(CACHE_KEY_LAST_PIXEL_UPDATE).await
    }

    /// Advance the watermark. A value behind the current one is ignored so
    /// the watermark never moves backwards.
    pub async fn set_watermark(&self, timestamp: i64) -> Result<()> {
        if let Some(existing) = self.watermark().await {
            if existing > timestamp {
                tracing::warn!(
                    "Ignoring watermark regression: {existing} -> {timestamp}"
                );
                return Ok(());
            }
        }
        self.cache
            .set(
                CACHE_KEY_LAST_PIXEL_UPDATE,
                &timestamp,
                Duration::from_secs(WATERMARK_TTL_SECS),
            )
            .await
    }
}

pub(crate) fn pixel_from_value(value: &TypedValue) -> Result<PixelRecord> {
    let x = value.field("x")?.as_u64()?;
    let y = value.field("y")?.as_u64()?;
    let (address, color, played_count) = pixel_infos_from_value(value.field("pixel_infos")?)?;
    Ok(PixelRecord {
        x: coordinate(x)?,
        y: coordinate(y)?,
        address,
        color,
        played_count,
    })
}

pub(crate) fn pixel_infos_from_value(value: &TypedValue) -> Result<(String, PixelColor, u32)> {
    let address = value.field("address")?.as_address()?.to_string();
    let color = PixelColor::from_name(value.field("color")?.variant_name()?)?;
    let played_count = value.field("played_count")?.as_u64()?;
    let played_count = u32::try_from(played_count)
        .map_err(|_| AppError::Decode(format!("played count {played_count} out of range")))?;
    Ok((address, color, played_count))
}

pub(crate) fn coordinate(value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::Decode(format!("coordinate {value} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::services::testing::{encode_pixel, MemoryStore, MockContract};
    use std::collections::HashSet;

    fn service_with(
        store: Arc<MemoryStore>,
        contract: Arc<MockContract>,
        cache: Arc<Cache>,
    ) -> PixelService {
        let registry = Arc::new(AbiRegistry::from_embedded().unwrap());
        PixelService::new(store, cache, contract, registry, &test_config())
    }

    #[test]
    fn chunk_plan_covers_exact_multiple() {
        let chunks = chunk_plan(20, 10);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.width == 10 && c.height == 10));
    }

    #[test]
    fn chunk_plan_clips_final_chunk() {
        // grid 25, chunk 10 -> lebar 10, 10, 5 per dimensi
        let chunks = chunk_plan(25, 10);
        assert_eq!(chunks.len(), 9);

        let widths: Vec<u32> = chunks.iter().take(3).map(|c| c.width).collect();
        assert_eq!(widths, vec![10, 10, 5]);

        let mut covered = HashSet::new();
        for chunk in &chunks {
            for x in chunk.x..chunk.x + chunk.width {
                for y in chunk.y..chunk.y + chunk.height {
                    assert!(covered.insert((x, y)), "({x},{y}) covered twice");
                }
            }
        }
        assert_eq!(covered.len(), 625);
    }

    #[test]
    fn chunk_plan_is_row_major() {
        let chunks = chunk_plan(20, 10);
        assert_eq!((chunks[0].x, chunks[0].y), (0, 0));
        assert_eq!((chunks[1].x, chunks[1].y), (10, 0));
        assert_eq!((chunks[2].x, chunks[2].y), (0, 10));
    }

    #[tokio::test]
    async fn cold_start_refresh_loads_grid_and_sets_watermark() {
        let store = Arc::new(MemoryStore::new());
        let contract = Arc::new(
            MockContract::new(10).with_chunk(
                0,
                0,
                vec![
                    encode_pixel(1, 1, &[1u8; 32], PixelColor::Red, 3),
                    encode_pixel(2, 2, &[2u8; 32], PixelColor::Blue, 1),
                    encode_pixel(9, 9, &[3u8; 32], PixelColor::White, 0),
                ],
            ),
        );
        let cache = Arc::new(Cache::new());
        let service = service_with(store.clone(), contract, cache);

        let before = chrono::Utc::now().timestamp();
        let pixels = service.get_all_pixels().await.unwrap();
        let after = chrono::Utc::now().timestamp();

        assert_eq!(pixels.len(), 3);
        let stored = store.all_pixels().await.unwrap();
        assert_eq!(stored.len(), 3);

        let white = store.find_pixel(9, 9).await.unwrap().unwrap();
        assert_eq!(white.color, PixelColor::White);
        assert!(white.address.starts_with("erd1"));

        let watermark = service.watermark().await.unwrap();
        assert!(watermark >= before && watermark <= after);
    }

    #[tokio::test]
    async fn concurrent_cold_starts_run_a_single_refresh_pass() {
        let store = Arc::new(MemoryStore::new());
        let contract = Arc::new(
            MockContract::new(10)
                .with_chunk(0, 0, vec![encode_pixel(4, 4, &[5u8; 32], PixelColor::Blue, 1)])
                .with_query_delay(std::time::Duration::from_millis(20)),
        );
        let cache = Arc::new(Cache::new());
        let service = Arc::new(service_with(store.clone(), contract, cache));

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.get_all_pixels().await }
        });
        let second = tokio::spawn({
            let service = service.clone();
            async move { service.get_all_pixels().await }
        });

        assert_eq!(first.await.unwrap().unwrap().len(), 1);
        assert_eq!(second.await.unwrap().unwrap().len(), 1);

        // Satu sel logis, satu baris di store
        assert_eq!(store.all_pixels().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn warm_start_reads_store_without_contract_calls() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_pixel(&PixelRecord {
                x: 0,
                y: 0,
                address: "erd1test".to_string(),
                color: PixelColor::Black,
                played_count: 2,
            })
            .await
            .unwrap();

        let contract = Arc::new(MockContract::new(10));
        let cache = Arc::new(Cache::new());
        let service = service_with(store, contract.clone(), cache);
        service.set_watermark(1000).await.unwrap();

        let pixels = service.get_all_pixels().await.unwrap();
        assert_eq!(pixels.len(), 1);
        assert_eq!(contract.query_calls(), 0);
    }

    #[tokio::test]
    async fn repeated_grid_size_lookups_hit_cache() {
        let store = Arc::new(MemoryStore::new());
        let contract = Arc::new(MockContract::new(100));
        let cache = Arc::new(Cache::new());
        let service = service_with(store, contract.clone(), cache);

        assert_eq!(service.grid_size().await.unwrap(), 100);
        assert_eq!(service.grid_size().await.unwrap(), 100);
        assert_eq!(contract.query_calls(), 1);
    }

    #[tokio::test]
    async fn out_of_bounds_coordinates_are_a_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let contract = Arc::new(MockContract::new(10));
        let cache = Arc::new(Cache::new());
        let service = service_with(store, contract, cache);

        let result = service.get_pixel_infos(10, 0).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn pixel_infos_price_is_zero_for_untouched_cell() {
        let store = Arc::new(MemoryStore::new());
        let contract = Arc::new(MockContract::new(10));
        let cache = Arc::new(Cache::new());
        let service = service_with(store, contract, cache);

        let infos = service.get_pixel_infos(3, 3).await.unwrap();
        assert_eq!(infos.price_to_change, "0");
    }

    #[tokio::test]
    async fn pixel_infos_price_comes_from_contract_for_played_cell() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_pixel(&PixelRecord {
                x: 3,
                y: 3,
                address: "erd1test".to_string(),
                color: PixelColor::Red,
                played_count: 2,
            })
            .await
            .unwrap();

        let contract = Arc::new(MockContract::new(10).with_price(2, 4000));
        let cache = Arc::new(Cache::new());
        let service = service_with(store, contract, cache);

        let infos = service.get_pixel_infos(3, 3).await.unwrap();
        assert_eq!(infos.price_to_change, "4000");
    }

    #[tokio::test]
    async fn watermark_never_moves_backwards() {
        let store = Arc::new(MemoryStore::new());
        let contract = Arc::new(MockContract::new(10));
        let cache = Arc::new(Cache::new());
        let service = service_with(store, contract, cache);

        service.set_watermark(1050).await.unwrap();
        service.set_watermark(900).await.unwrap();
        assert_eq!(service.watermark().await, Some(1050));

        service.set_watermark(1100).await.unwrap();
        assert_eq!(service.watermark().await, Some(1100));
    }

    #[tokio::test]
    async fn decode_failure_aborts_refresh_without_watermark() {
        let store = Arc::new(MemoryStore::new());
        // Chunk berisi payload yang terpotong
        let contract = Arc::new(MockContract::new(10).with_chunk(0, 0, vec![vec![0x01, 0x02]]));
        let cache = Arc::new(Cache::new());
        let service = service_with(store, contract, cache);

        assert!(service.get_all_pixels().await.is_err());
        assert_eq!(service.watermark().await, None);
    }

    #[tokio::test]
    async fn pixel_config_lists_all_six_colors() {
        let store = Arc::new(MemoryStore::new());
        let contract = Arc::new(MockContract::new(10));
        let cache = Arc::new(Cache::new());
        let service = service_with(store, contract, cache);

        let config = service.get_pixel_config();
        assert_eq!(config.available_colors.len(), 6);
        assert_eq!(config.available_colors[0].color_hex, "#FF0000");
        assert_eq!(config.available_colors[5].discriminant, 5);
    }
}
