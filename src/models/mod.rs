pub mod pixel;

pub use pixel::{
    AvailableColorResponse, PixelColor, PixelConfigResponse, PixelInfosResponse, PixelRecord,
    PixelResponse,
};

use serde::Serialize;

// ==================== API RESPONSE ====================
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
