use axum::{Json, extract::State};
use ddcc_core::ResourceStore;
use serde_json::{Value, json};

use crate::AppState;

/// Liveness. Does not touch the store.
pub async fn handler<S>(State(state): State<AppState<S>>) -> Json<Value>
where
  S: ResourceStore + 'static,
{
  Json(json!({ "status": "ok", "store": state.config.store.backend() }))
}
