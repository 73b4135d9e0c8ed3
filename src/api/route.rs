use crate::{
    api::{error::ApiError, response::ApiResponse},
    matcher::PriceTick,
    state::AppState,
    validation::{validate_price, validate_side, validate_solana_address},
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;

// POST /on_token_price body
#[derive(Debug, Deserialize)]
pub struct TokenPriceRequest {
    pub chain_id: i64,
    pub token_address: String,
    pub side: String,
    pub price: String,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/on_token_price", post(on_token_price))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

// POST /on_token_price handler
async fn on_token_price(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenPriceRequest>,
) -> Result<ApiResponse<Value>, ApiError> {
    validate_solana_address(&body.token_address)?;
    let side = validate_side(&body.side)?;
    let price = validate_price(&body.price)?;

    debug!(token = %body.token_address, %side, %price, "Price update received");
    let tick = PriceTick { chain_id: body.chain_id, token_address: body.token_address, side, price };
    state.matcher.submit(tick).await?;

    Ok(ApiResponse::new(json!({ "accepted": true })))
}

async fn health(State(state): State<Arc<AppState>>) -> ApiResponse<Value> {
    ApiResponse::new(json!({ "status": "ok", "chain_id": state.config.chain_id }))
}
