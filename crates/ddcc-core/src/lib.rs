//! Core types and trait definitions for the DDCC certificate pipeline.
//!
//! This crate is deliberately free of HTTP and runtime dependencies. It holds
//! the typed view of the FHIR resources the pipeline consumes, the
//! [`store::ResourceStore`] contract every backend implements, and the static
//! vaccine catalog.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod datatype;
pub mod dose;
pub mod error;
pub mod outcome;
pub mod resource;
pub mod store;

pub use catalog::{VaccineCatalog, VaccineClassification, VaccineScope};
pub use dose::DoseRecord;
pub use error::{Error, Result};
pub use outcome::OperationOutcome;
pub use resource::{Resource, ResourceType};
pub use store::{
  Created, FetchError, ResourceStore, SearchQuery, SearchSet, StoreError,
  StoreResult,
};
