//! Error types and axum `IntoResponse` implementation.
//!
//! Every failure leaves as a FHIR `OperationOutcome`. The first issue carries
//! the outcome kind as a coding and the failed step in `diagnostics`; each
//! resource the failure left in the store follows as an informational issue.
//! Transport failures are described with a fixed text; their detail only
//! goes to the log.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use ddcc_core::{
  OperationOutcome, StoreError,
  datatype::Coding,
  outcome::Issue,
};
use ddcc_issuer::{FolderError, IssuanceError, OutcomeKind};
use thiserror::Error;

/// Coding system of the outcome-kind coding on error issues.
pub const OUTCOME_KIND_SYSTEM: &str = "urn:ddcc:outcome-kind";

pub const FHIR_JSON: &str = "application/fhir+json";

/// Seconds a client should wait before retrying a timed-out request.
pub const RETRY_AFTER_SECS: &str = "5";

const STORE_UNREACHABLE: &str = "the document store could not be reached";

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Issuance(#[from] IssuanceError),
  #[error("folder sync failed: {0}")]
  Folder(#[from] FolderError),
  #[error("{0} not found")]
  NotFound(String),
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("{0:?} is neither \"routine\" nor a non-routine vaccine code")]
  InvalidScope(String),
}

fn store_status(e: &StoreError) -> (StatusCode, &'static str, OutcomeKind) {
  match e {
    StoreError::Rejected { .. } => (
      StatusCode::BAD_GATEWAY,
      "processing",
      OutcomeKind::StoreValidationError,
    ),
    StoreError::Transport(_) => (
      StatusCode::BAD_GATEWAY,
      "transient",
      OutcomeKind::StoreTransportError,
    ),
    StoreError::Timeout => (
      StatusCode::GATEWAY_TIMEOUT,
      "timeout",
      OutcomeKind::StoreTimeout,
    ),
  }
}

fn issuance_status(e: &IssuanceError) -> (StatusCode, &'static str) {
  match e {
    IssuanceError::InvalidVaccineCode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "code-invalid"),
    IssuanceError::MalformedImmunization { .. } | IssuanceError::MalformedPatient { .. } => {
      (StatusCode::UNPROCESSABLE_ENTITY, "invalid")
    }
    IssuanceError::NoDoseHistory => (StatusCode::UNPROCESSABLE_ENTITY, "business-rule"),
    IssuanceError::ImmunizationNotFound(_)
    | IssuanceError::PatientNotFound(_)
    | IssuanceError::FacilityNotFound(_) => (StatusCode::NOT_FOUND, "not-found"),
    IssuanceError::RenderFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "exception"),
    IssuanceError::StoreFailed { source, .. } => {
      let (status, code, _) = store_status(source);
      (status, code)
    }
  }
}

fn kind_coding(kind: &str) -> Coding {
  Coding {
    system:  Some(OUTCOME_KIND_SYSTEM.into()),
    code:    Some(kind.into()),
    display: None,
  }
}

/// An outcome whose first issue is tagged with `kind`.
fn outcome(code: &str, kind: &str, text: String) -> OperationOutcome {
  let mut outcome = OperationOutcome::error(code, text);
  if let Some(details) = outcome.issue.first_mut().and_then(|i| i.details.as_mut()) {
    details.coding.push(kind_coding(kind));
  }
  outcome
}

fn issuance_text(e: &IssuanceError) -> String {
  match e {
    IssuanceError::StoreFailed {
      step,
      source: StoreError::Transport(_),
      ..
    } => format!("issuance failed at {step}: {STORE_UNREACHABLE}"),
    other => other.to_string(),
  }
}

fn issuance_outcome(e: &IssuanceError) -> (StatusCode, OperationOutcome) {
  let (status, code) = issuance_status(e);
  let mut body = outcome(code, e.kind().as_str(), issuance_text(e));
  if let (Some(step), Some(first)) = (e.step(), body.issue.first_mut()) {
    first.diagnostics = Some(format!("step: {step}"));
  }
  body.issue.extend(e.created().iter().map(|key| Issue {
    severity:    "information".into(),
    code:        "informational".into(),
    details:     None,
    diagnostics: Some(key.to_string()),
    expression:  Vec::new(),
  }));
  (status, body)
}

impl Error {
  /// The outcome kind reported to the client, if the error carries one.
  pub fn kind(&self) -> Option<OutcomeKind> {
    match self {
      Error::Issuance(e) => Some(e.kind()),
      Error::Folder(FolderError::Store(e)) => Some(store_status(e).2),
      Error::Folder(FolderError::Decode(_)) => Some(OutcomeKind::StoreValidationError),
      Error::InvalidScope(_) => Some(OutcomeKind::InvalidVaccineCode),
      Error::NotFound(_) | Error::BadRequest(_) => None,
    }
  }

  fn outcome(&self) -> (StatusCode, OperationOutcome) {
    match self {
      Error::Issuance(e) => issuance_outcome(e),
      Error::Folder(FolderError::Store(e)) => {
        let (status, code, kind) = store_status(e);
        let text = match e {
          StoreError::Transport(_) => format!("folder sync failed: {STORE_UNREACHABLE}"),
          _ => self.to_string(),
        };
        (status, outcome(code, kind.as_str(), text))
      }
      Error::Folder(FolderError::Decode(_)) => (
        StatusCode::BAD_GATEWAY,
        outcome(
          "processing",
          OutcomeKind::StoreValidationError.as_str(),
          self.to_string(),
        ),
      ),
      Error::NotFound(_) => (
        StatusCode::NOT_FOUND,
        OperationOutcome::error("not-found", self.to_string()),
      ),
      Error::BadRequest(_) => (
        StatusCode::BAD_REQUEST,
        OperationOutcome::error("structure", self.to_string()),
      ),
      Error::InvalidScope(_) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        outcome(
          "code-invalid",
          OutcomeKind::InvalidVaccineCode.as_str(),
          self.to_string(),
        ),
      ),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let (status, body) = self.outcome();
    if status.is_server_error() {
      tracing::error!(%status, error = %self, "request failed");
    } else {
      tracing::info!(%status, error = %self, "request rejected");
    }
    let mut response = (status, [(header::CONTENT_TYPE, FHIR_JSON)], Json(body)).into_response();
    if self.kind().is_some_and(|kind| kind.is_retryable()) {
      response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
    }
    response
  }
}
