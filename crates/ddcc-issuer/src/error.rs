//! Issuance failures and the outcome kinds reported to callers.

use std::fmt;

use ddcc_core::{ResourceType, StoreError};
use serde::Serialize;
use thiserror::Error;

// ─── Steps and keys ──────────────────────────────────────────────────────────

/// The pipeline step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
  ReadImmunization,
  DedupCheck,
  ReadPatient,
  ReadLocation,
  LoadHistory,
  Render,
  CreateOrganization,
  CreateComposition,
  CreateBinary,
  CreateBundle,
  PutDocumentReference,
  ResyncFolder,
}

impl Step {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::ReadImmunization => "read-immunization",
      Self::DedupCheck => "dedup-check",
      Self::ReadPatient => "read-patient",
      Self::ReadLocation => "read-location",
      Self::LoadHistory => "load-history",
      Self::Render => "render",
      Self::CreateOrganization => "create-organization",
      Self::CreateComposition => "create-composition",
      Self::CreateBinary => "create-binary",
      Self::CreateBundle => "create-bundle",
      Self::PutDocumentReference => "put-document-reference",
      Self::ResyncFolder => "resync-folder",
    }
  }
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `{type}/{id}` of a resource the pipeline wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
  pub resource_type: ResourceType,
  pub id:            String,
}

impl ResourceKey {
  pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
    Self {
      resource_type,
      id: id.into(),
    }
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.resource_type, self.id)
  }
}

/// What the compensator managed to undo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Compensation {
  pub deleted: Vec<ResourceKey>,
  pub failed:  Vec<ResourceKey>,
}

// ─── Outcome kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
  AlreadyIssued,
  InvalidVaccineCode,
  ImmunizationNotFound,
  MalformedImmunization,
  PatientNotFound,
  MalformedPatient,
  FacilityNotFound,
  NoDoseHistory,
  RenderFailed,
  StoreTransportError,
  StoreValidationError,
  StoreTimeout,
}

impl OutcomeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::AlreadyIssued => "AlreadyIssued",
      Self::InvalidVaccineCode => "InvalidVaccineCode",
      Self::ImmunizationNotFound => "ImmunizationNotFound",
      Self::MalformedImmunization => "MalformedImmunization",
      Self::PatientNotFound => "PatientNotFound",
      Self::MalformedPatient => "MalformedPatient",
      Self::FacilityNotFound => "FacilityNotFound",
      Self::NoDoseHistory => "NoDoseHistory",
      Self::RenderFailed => "RenderFailed",
      Self::StoreTransportError => "StoreTransportError",
      Self::StoreValidationError => "StoreValidationError",
      Self::StoreTimeout => "StoreTimeout",
    }
  }

  /// Only timeouts are worth retrying unchanged.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::StoreTimeout) }
}

impl fmt::Display for OutcomeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── IssuanceError ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum IssuanceError {
  #[error("vaccine code {0:?} is not in the catalog")]
  InvalidVaccineCode(String),

  #[error("immunization {0} not found")]
  ImmunizationNotFound(String),

  #[error("immunization {id} is malformed: {reason}")]
  MalformedImmunization { id: String, reason: String },

  #[error("patient {0} not found")]
  PatientNotFound(String),

  #[error("patient {id} is malformed: {reason}")]
  MalformedPatient { id: String, reason: String },

  #[error("facility {0} not found")]
  FacilityNotFound(String),

  #[error("patient has no doses in scope")]
  NoDoseHistory,

  #[error("certificate rendering failed: {0}")]
  RenderFailed(String),

  /// A store call failed. `created` lists what had already been written and
  /// was not compensated.
  #[error("issuance failed at {step}: {source}")]
  StoreFailed {
    step:         Step,
    created:      Vec<ResourceKey>,
    compensation: Option<Compensation>,
    #[source]
    source:       StoreError,
  },
}

impl IssuanceError {
  pub(crate) fn store(step: Step, source: StoreError) -> Self {
    Self::StoreFailed {
      step,
      created: Vec::new(),
      compensation: None,
      source,
    }
  }

  pub fn kind(&self) -> OutcomeKind {
    match self {
      Self::InvalidVaccineCode(_) => OutcomeKind::InvalidVaccineCode,
      Self::ImmunizationNotFound(_) => OutcomeKind::ImmunizationNotFound,
      Self::MalformedImmunization { .. } => OutcomeKind::MalformedImmunization,
      Self::PatientNotFound(_) => OutcomeKind::PatientNotFound,
      Self::MalformedPatient { .. } => OutcomeKind::MalformedPatient,
      Self::FacilityNotFound(_) => OutcomeKind::FacilityNotFound,
      Self::NoDoseHistory => OutcomeKind::NoDoseHistory,
      Self::RenderFailed(_) => OutcomeKind::RenderFailed,
      Self::StoreFailed { source, .. } => match source {
        StoreError::Rejected { .. } => OutcomeKind::StoreValidationError,
        StoreError::Transport(_) => OutcomeKind::StoreTransportError,
        StoreError::Timeout => OutcomeKind::StoreTimeout,
      },
    }
  }

  pub fn step(&self) -> Option<Step> {
    match self {
      Self::StoreFailed { step, .. } => Some(*step),
      Self::NoDoseHistory | Self::RenderFailed(_) => Some(Step::Render),
      _ => None,
    }
  }

  /// Resources left behind in the store by this failure.
  pub fn created(&self) -> &[ResourceKey] {
    match self {
      Self::StoreFailed { created, .. } => created,
      _ => &[],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn store_failures_map_to_outcome_kinds() {
    let kind = |e| IssuanceError::store(Step::CreateBinary, e).kind();
    assert_eq!(kind(StoreError::Timeout), OutcomeKind::StoreTimeout);
    assert_eq!(
      kind(StoreError::Transport("reset".into())),
      OutcomeKind::StoreTransportError
    );
    assert_eq!(
      kind(StoreError::rejected(422, "invalid", "nope")),
      OutcomeKind::StoreValidationError
    );
    assert!(OutcomeKind::StoreTimeout.is_retryable());
    assert!(!OutcomeKind::StoreTransportError.is_retryable());
  }

  #[test]
  fn resource_key_displays_as_reference() {
    assert_eq!(
      ResourceKey::new(ResourceType::Binary, "b1").to_string(),
      "Binary/b1"
    );
  }
}
