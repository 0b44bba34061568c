use axum::{routing::get, Router};

use super::{forecast, health};
use crate::app::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", get(forecast::predict))
        .route("/health", get(health::health_check))
        .with_state(state)
}
