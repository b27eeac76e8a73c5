//! HTTP surface of the node

pub mod conversations;
pub mod error;
pub mod extract;
pub mod presence;

use axum::Json;
use serde_json::{json, Value};

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
