//! Error types for `ddcc-core`.

use thiserror::Error;

use crate::resource::ResourceType;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid vaccine code: {0:?}")]
  InvalidVaccineCode(String),

  #[error("expected a {expected} resource, got {found:?}")]
  WrongResourceType {
    expected: ResourceType,
    found:    Option<String>,
  },

  #[error("{resource_type} is missing required field `{field}`")]
  MissingField {
    resource_type: ResourceType,
    field:         &'static str,
  },

  #[error("{resource_type} has an invalid `{field}`: {value:?}")]
  InvalidField {
    resource_type: ResourceType,
    field:         &'static str,
    value:         String,
  },

  #[error("vaccine catalog file error: {0}")]
  CatalogFile(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// The offending field name for decode failures.
  pub fn field(&self) -> Option<&'static str> {
    match self {
      Self::MissingField { field, .. } | Self::InvalidField { field, .. } => {
        Some(*field)
      }
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
