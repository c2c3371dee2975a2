use axum::response::Json;
use serde_json::{Value, json};

/// Liveness check with the crate version.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
