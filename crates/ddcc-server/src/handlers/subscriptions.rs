//! Rest-hook notifications from the FHIR server.
//!
//! The notification body is the Immunization that matched the subscription
//! criteria, or a Bundle wrapping it.

use axum::{
  Json,
  extract::State,
  response::Response,
};
use ddcc_core::{ResourceStore, ResourceType, resource::body_id};
use serde_json::Value;

use crate::{AppState, error::Error, handlers::issuance_response};

/// The id of the Immunization a notification is about.
fn notified_immunization(body: &Value) -> Option<&str> {
  let is_immunization =
    |v: &Value| v.get("resourceType").and_then(Value::as_str) == Some(ResourceType::Immunization.as_str());
  if is_immunization(body) {
    return body_id(body);
  }
  body
    .get("entry")?
    .as_array()?
    .iter()
    .filter_map(|e| e.get("resource"))
    .find(|r| is_immunization(r))
    .and_then(body_id)
}

pub async fn notify<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<Value>,
) -> Result<Response, Error>
where
  S: ResourceStore + 'static,
{
  let immunization_id = notified_immunization(&body)
    .ok_or_else(|| Error::BadRequest("notification carries no Immunization id".into()))?
    .to_owned();
  tracing::info!(%immunization_id, "subscription notification received");
  let issuance = state.issuer.issue_certificate(&immunization_id).await?;
  Ok(issuance_response(issuance))
}
