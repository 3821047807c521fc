//! The pipeline entry point.

use axum::{
  extract::{Path, State},
  response::Response,
};
use ddcc_core::ResourceStore;

use crate::{AppState, error::Error, handlers::issuance_response};

pub async fn issue<S>(
  State(state): State<AppState<S>>,
  Path(immunization_id): Path<String>,
) -> Result<Response, Error>
where
  S: ResourceStore + 'static,
{
  let issuance = state.issuer.issue_certificate(&immunization_id).await?;
  Ok(issuance_response(issuance))
}
