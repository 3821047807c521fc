pub mod certificates;
pub mod folders;
pub mod health;
pub mod subscriptions;

use axum::{
  Json,
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use ddcc_core::{VaccineCatalog, VaccineScope, resource::FolderIndex};
use ddcc_issuer::{Issuance, IssuanceStatus};
use serde::Serialize;

use crate::error::{Error, FHIR_JSON};

// ─── Response bodies ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderBody {
  pub id:         String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version_id: Option<String>,
  pub patient_id: String,
  pub scope:      String,
  pub entries:    Vec<String>,
}

impl From<FolderIndex> for FolderBody {
  fn from(f: FolderIndex) -> Self {
    Self {
      id:         f.id,
      version_id: f.version_id,
      patient_id: f.patient_id,
      scope:      f.scope,
      entries:    f.entries,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceBody {
  pub status:             &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub document_reference: Option<String>,
  pub folder:             FolderBody,
}

/// `201` for a fresh certificate, `200` when the event was already covered.
pub(super) fn issuance_response(issuance: Issuance) -> Response {
  let (status, body) = match issuance.status {
    IssuanceStatus::Issued { document_ref_id } => (
      StatusCode::CREATED,
      IssuanceBody {
        status:             "issued",
        document_reference: Some(format!("DocumentReference/{document_ref_id}")),
        folder:             issuance.folder.into(),
      },
    ),
    IssuanceStatus::AlreadyIssued => (
      StatusCode::OK,
      IssuanceBody {
        status:             "already_issued",
        document_reference: None,
        folder:             issuance.folder.into(),
      },
    ),
  };
  json_response(status, body)
}

pub(super) fn json_response(status: StatusCode, body: impl Serialize) -> Response {
  (status, [(header::CONTENT_TYPE, FHIR_JSON)], Json(body)).into_response()
}

/// A folder scope from the URL: `routine` or a known non-routine code.
pub(super) fn parse_scope(catalog: &VaccineCatalog, key: &str) -> Result<VaccineScope, Error> {
  let scope = VaccineScope::from_key(key);
  match &scope {
    VaccineScope::Routine => Ok(scope),
    VaccineScope::NonRoutine(code) => match catalog.classify(code) {
      Ok(c) if !c.is_routine => Ok(scope),
      _ => Err(Error::InvalidScope(key.to_owned())),
    },
  }
}
