use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, types::SystemStatusResponse};

/// GET /system/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatusResponse>>, ApiError> {
    let total_accounts = state
        .store()
        .account_count()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count accounts: {e}")))?;

    Ok(Json(ApiResponse::success(SystemStatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        total_accounts,
    })))
}
