use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::Result,
    models::{ApiResponse, PixelConfigResponse, PixelInfosResponse, PixelResponse},
};

use super::AppState;

/// GET /api/v1/pixels
pub async fn get_all_pixels(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PixelResponse>>>> {
    let pixels = state.pixels.get_all_pixels().await?;

    Ok(Json(ApiResponse::success(
        pixels.into_iter().map(PixelResponse::from).collect(),
    )))
}

/// GET /api/v1/pixels/{x}/{y}
pub async fn get_pixel_infos(
    State(state): State<AppState>,
    Path((x, y)): Path<(u32, u32)>,
) -> Result<Json<ApiResponse<PixelInfosResponse>>> {
    let infos = state.pixels.get_pixel_infos(x, y).await?;
    Ok(Json(ApiResponse::success(infos)))
}

/// GET /api/v1/pixels/config
pub async fn get_pixel_config(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PixelConfigResponse>>> {
    Ok(Json(ApiResponse::success(state.pixels.get_pixel_config())))
}
