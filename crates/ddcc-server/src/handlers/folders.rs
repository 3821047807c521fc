//! Read and resync a patient's certificate folder.

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::Response,
};
use ddcc_core::ResourceStore;

use crate::{
  AppState,
  error::Error,
  handlers::{FolderBody, json_response, parse_scope},
};

pub async fn show<S>(
  State(state): State<AppState<S>>,
  Path((patient_id, scope)): Path<(String, String)>,
) -> Result<Response, Error>
where
  S: ResourceStore + 'static,
{
  let scope = parse_scope(state.issuer.catalog(), &scope)?;
  let folder = state
    .issuer
    .folders()
    .find(&patient_id, &scope)
    .await?
    .ok_or_else(|| Error::NotFound(format!("folder {scope} for Patient/{patient_id}")))?;
  Ok(json_response(StatusCode::OK, FolderBody::from(folder)))
}

pub async fn resync<S>(
  State(state): State<AppState<S>>,
  Path((patient_id, scope)): Path<(String, String)>,
) -> Result<Response, Error>
where
  S: ResourceStore + 'static,
{
  let scope = parse_scope(state.issuer.catalog(), &scope)?;
  let folder = state.issuer.folders().resync(&patient_id, &scope).await?;
  Ok(json_response(StatusCode::OK, FolderBody::from(folder)))
}
