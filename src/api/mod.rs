// src/api/mod.rs

pub mod health;
pub mod pixels;

use crate::config::Config;
use crate::db::Database;
use crate::services::PixelService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub pixels: Arc<PixelService>,
    pub config: Config,
}
