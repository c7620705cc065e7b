use std::sync::Arc;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use log::error;

use crate::data::SymbolQuote;
use crate::hub::BroadcastHub;

#[derive(Clone)]
pub struct ApiState {
    pub hub: Arc<BroadcastHub>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

// GET /api/stocks - Latest value of every tracked symbol
pub async fn get_stocks(
    State(state): State<ApiState>,
) -> Result<Json<Vec<SymbolQuote>>, (StatusCode, Json<ApiError>)> {
    match state.hub.book().snapshot() {
        Ok(quotes) => Ok(Json(quotes)),
        Err(e) => {
            error!("Failed to read stock snapshot: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(ApiError {
                error: e.to_string(),
            })))
        }
    }
}

// GET /api/health - Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "stock_stream",
        "symbols": state.hub.book().len(),
        "subscribers": state.hub.subscriber_count(),
        "timestamp": chrono::Utc::now()
    }))
}

// Create the API router
pub fn create_api_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stocks", get(get_stocks))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
}
