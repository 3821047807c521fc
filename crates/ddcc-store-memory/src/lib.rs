//! In-process backend for the DDCC resource store.
//!
//! Keeps every resource as JSON in per-type, insertion-ordered tables behind a
//! mutex. Used by the test suites and for local runs without a FHIR server.
//! Carries an operation log and fault injection so tests can observe and
//! break individual store calls.

mod fault;
mod search;
mod store;

pub use fault::{Fault, Op};
pub use store::MemoryStore;
