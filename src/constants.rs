/// Application constants

// Cache keys
pub const CACHE_KEY_GRID_SIZE: &str = "grid-size";
pub const CACHE_KEY_LAST_PIXEL_UPDATE: &str = "last-pixel-update";

// Cache TTLs
pub const GRID_SIZE_TTL_SECS: u64 = 30 * 24 * 3600; // grid size never changes for a deployed contract
pub const PIXELS_CHUNK_TTL_SECS: u64 = 6;
pub const PIXEL_PRICE_TTL_SECS: u64 = 10 * 60;
pub const WATERMARK_TTL_SECS: u64 = 2 * 365 * 24 * 3600; // must outlive any realistic process uptime

// Contract interface
pub const ENDPOINT_GET_GRID_SIZE: &str = "getGridSize";
pub const ENDPOINT_GET_PIXELS: &str = "getPixels";
pub const ENDPOINT_GET_PIXEL_PRICE: &str = "getPixelPrice";
pub const FUNCTION_CHANGE_PIXEL_COLOR: &str = "changePixelColor";
pub const STRUCT_PIXEL: &str = "Pixel";
pub const STRUCT_PIXEL_INFOS: &str = "PixelInfos";
pub const ENUM_COLOR: &str = "Color";

// Grid scan defaults
pub const DEFAULT_CHUNK_SIZE: u32 = 10;
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 4;

// Background service intervals
pub const SYNC_INTERVAL_SECS: u64 = 6;

// Remote call budget
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

// API version
pub const API_VERSION: &str = "v1";
