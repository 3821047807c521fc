//! Issuer settings.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

const DEFAULT_HOST: &str = "https://chanjoke.intellisoftkenya.com";

fn default_coding_system() -> String { format!("{DEFAULT_HOST}/hapi/fhir") }

fn default_profile_base() -> String { format!("{DEFAULT_HOST}/hapi/fhir/StructureDefinition") }

fn default_verification_base() -> String { format!("{DEFAULT_HOST}/digital-certificates") }

fn default_store_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct IssuerConfig {
  /// System of the scope codings on Composition, DocumentReference and List,
  /// and of the Bundle identifier.
  #[serde(default = "default_coding_system")]
  pub coding_system:       String,
  /// Profiles are `{profile_base}/{name}`.
  #[serde(default = "default_profile_base")]
  pub profile_base:        String,
  /// The QR payload is `{verification_base}/{documentRefId}/$validate`.
  #[serde(default = "default_verification_base")]
  pub verification_base:   String,
  /// Upper bound on every single store call.
  #[serde(default = "default_store_timeout_secs")]
  pub store_timeout_secs:  u64,
  /// Delete already-created resources when a later write fails.
  #[serde(default)]
  pub rollback_on_failure: bool,
  /// Also write each rendered PDF to `{archive_dir}/{documentRefId}.pdf`.
  #[serde(default)]
  pub archive_dir:         Option<PathBuf>,
}

impl Default for IssuerConfig {
  fn default() -> Self {
    Self {
      coding_system:       default_coding_system(),
      profile_base:        default_profile_base(),
      verification_base:   default_verification_base(),
      store_timeout_secs:  default_store_timeout_secs(),
      rollback_on_failure: false,
      archive_dir:         None,
    }
  }
}

impl IssuerConfig {
  pub fn store_timeout(&self) -> Duration { Duration::from_secs(self.store_timeout_secs) }

  pub fn profile(&self, name: &str) -> String {
    format!("{}/{}", self.profile_base.trim_end_matches('/'), name)
  }

  pub fn verification_url(&self, document_ref_id: &str) -> String {
    format!(
      "{}/{}/$validate",
      self.verification_base.trim_end_matches('/'),
      document_ref_id
    )
  }
}
