//! The certificate issuance pipeline.
//!
//! [`Issuer::issue_certificate`] turns one completed Immunization into a
//! rendered certificate, the FHIR document resources that carry it, and an
//! up-to-date per-patient folder. Everything goes through a
//! [`ddcc_core::ResourceStore`], so the same pipeline runs against a FHIR
//! server or the in-memory store.

mod config;
mod deadline;
mod error;
pub mod folder;
pub mod history;
mod issuer;
pub mod progress;
mod resources;
mod subscription;

pub use config::IssuerConfig;
pub use error::{Compensation, IssuanceError, OutcomeKind, ResourceKey, Step};
pub use folder::{FolderError, FolderIndexManager};
pub use issuer::{Issuance, IssuanceStatus, Issuer};
pub use progress::{WriteProgress, WriteStage};
pub use subscription::{SubscriptionConfig, upsert_subscription};

#[cfg(test)]
mod tests;
