//! FHIR R4 REST backend for the DDCC resource store.
//!
//! Talks JSON (`application/fhir+json`) to a FHIR server over
//! [`reqwest`]. Failures are mapped onto [`ddcc_core::StoreError`]; nothing
//! is retried here.

mod config;
mod response;
mod store;

pub use config::FhirConfig;
pub use store::FhirStore;

#[cfg(test)]
mod tests;
