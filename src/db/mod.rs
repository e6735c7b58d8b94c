use crate::{
    config::Config,
    error::{AppError, Result},
    models::{PixelColor, PixelRecord},
};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

/// Persistence contract for the materialized grid view. `Database` is the
/// production implementation; tests substitute an in-memory store.
#[async_trait]
pub trait GridStore: Send + Sync {
    /// All cells, in stable insertion order.
    async fn all_pixels(&self) -> Result<Vec<PixelRecord>>;

    async fn find_pixel(&self, x: u32, y: u32) -> Result<Option<PixelRecord>>;

    /// Replace the cell at `(x, y)` or insert it. Atomic per coordinate.
    async fn upsert_pixel(&self, record: &PixelRecord) -> Result<()>;

    /// Bulk load for the full refresh pass.
    async fn insert_pixels(&self, records: &[PixelRecord]) -> Result<()>;

    /// Wipe the view. Only called when no sync watermark exists.
    async fn clear_pixels(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct PixelRow {
    x: i32,
    y: i32,
    address: String,
    color: String,
    played_count: i32,
}

impl PixelRow {
    fn into_record(self) -> Result<PixelRecord> {
        let color = PixelColor::from_name(&self.color).map_err(|_| {
            AppError::Internal(format!(
                "pixel ({}, {}) has unknown stored color {}",
                self.x, self.y, self.color
            ))
        })?;
        Ok(PixelRecord {
            x: self.x as u32,
            y: self.y as u32,
            address: self.address,
            color,
            played_count: self.played_count as u32,
        })
    }
}

// ==================== PIXEL QUERIES ====================
#[async_trait]
impl GridStore for Database {
    async fn all_pixels(&self) -> Result<Vec<PixelRecord>> {
        let rows = sqlx::query_as::<_, PixelRow>(
            "SELECT x, y, address, color, played_count FROM pixels ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PixelRow::into_record).collect()
    }

    async fn find_pixel(&self, x: u32, y: u32) -> Result<Option<PixelRecord>> {
        let row = sqlx::query_as::<_, PixelRow>(
            "SELECT x, y, address, color, played_count FROM pixels WHERE x = $1 AND y = $2",
        )
        .bind(x as i32)
        .bind(y as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PixelRow::into_record).transpose()
    }

    async fn upsert_pixel(&self, record: &PixelRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO pixels (x, y, address, color, played_count)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (x, y) DO UPDATE
             SET address = EXCLUDED.address,
                 color = EXCLUDED.color,
                 played_count = EXCLUDED.played_count",
        )
        .bind(record.x as i32)
        .bind(record.y as i32)
        .bind(&record.address)
        .bind(record.color.name())
        .bind(record.played_count as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_pixels(&self, records: &[PixelRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO pixels (x, y, address, color, played_count)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(record.x as i32)
            .bind(record.y as i32)
            .bind(&record.address)
            .bind(record.color.name())
            .bind(record.played_count as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear_pixels(&self) -> Result<()> {
        sqlx::query("TRUNCATE pixels RESTART IDENTITY")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
