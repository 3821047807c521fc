//! Connection settings for the FHIR server.

use std::time::Duration;

use serde::Deserialize;

fn default_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct FhirConfig {
  /// Base URL of the FHIR endpoint, e.g. `http://hapi:8080/fhir`.
  pub base_url:     String,
  /// Per-request timeout in seconds.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Sent as `Authorization: Bearer <token>` when present.
  #[serde(default)]
  pub bearer_token: Option<String>,
}

impl FhirConfig {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url:     base_url.into(),
      timeout_secs: default_timeout_secs(),
      bearer_token: None,
    }
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}
