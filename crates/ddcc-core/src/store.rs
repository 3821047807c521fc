//! The `ResourceStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (`ddcc-store-fhir`,
//! `ddcc-store-memory`). The issuer and the server depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

use crate::{
  outcome::OperationOutcome,
  resource::{Resource, ResourceType},
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Failure of a single store call. Backends never retry.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
  /// The store understood the request and refused it.
  #[error("store rejected the request ({status}): {}", outcome.summary())]
  Rejected {
    status:  u16,
    outcome: OperationOutcome,
  },

  /// Connection failure, 5xx, or an undecodable response.
  #[error("store transport error: {0}")]
  Transport(String),

  #[error("store call timed out")]
  Timeout,
}

impl StoreError {
  /// Build a rejection carrying a synthetic single-issue outcome.
  pub fn rejected(status: u16, code: &str, text: impl Into<String>) -> Self {
    Self::Rejected {
      status,
      outcome: OperationOutcome::error(code, text),
    }
  }

  pub fn is_timeout(&self) -> bool { matches!(self, Self::Timeout) }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ─── Query types ─────────────────────────────────────────────────────────────

/// Search parameters for [`ResourceStore::search`], kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
  params: Vec<(String, String)>,
}

impl SearchQuery {
  pub fn new() -> Self { Self::default() }

  pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
    self.params.push((name.to_owned(), value.into()));
    self
  }

  pub fn params(&self) -> &[(String, String)] { &self.params }

  /// First value given for `name`.
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .params
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }
}

/// The full result set of a search, with paging already resolved.
#[derive(Debug, Clone, Default)]
pub struct SearchSet {
  pub total:   Option<u64>,
  pub entries: Vec<Value>,
}

/// A newly created resource and the id the store assigned.
#[derive(Debug, Clone)]
pub struct Created {
  pub id:   String,
  pub body: Value,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a versioned FHIR document store.
///
/// Bodies travel as raw JSON; typed decoding happens at the caller through
/// [`read_as`] or `Resource::decode`.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ResourceStore: Send + Sync {
  /// Create a resource; the store assigns its id.
  fn create<'a>(
    &'a self,
    resource_type: ResourceType,
    body: Value,
  ) -> impl Future<Output = StoreResult<Created>> + Send + 'a;

  /// Read a resource by id. Returns `None` if it does not exist or is gone.
  fn read<'a>(
    &'a self,
    resource_type: ResourceType,
    id: &'a str,
  ) -> impl Future<Output = StoreResult<Option<Value>>> + Send + 'a;

  /// Replace a resource. Creates it under `id` when the id is new.
  fn update<'a>(
    &'a self,
    resource_type: ResourceType,
    id: &'a str,
    body: Value,
  ) -> impl Future<Output = StoreResult<Value>> + Send + 'a;

  /// Search, following paging until the result set is exhausted.
  fn search<'a>(
    &'a self,
    resource_type: ResourceType,
    query: &'a SearchQuery,
  ) -> impl Future<Output = StoreResult<SearchSet>> + Send + 'a;

  /// Delete a resource. Deleting an absent id succeeds.
  fn delete<'a>(
    &'a self,
    resource_type: ResourceType,
    id: &'a str,
  ) -> impl Future<Output = StoreResult<()>> + Send + 'a;
}

// ─── Typed helpers ───────────────────────────────────────────────────────────

/// A typed fetch failed either in the store or while decoding the body.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Decode(#[from] crate::Error),
}

/// Read and decode a single resource.
pub async fn read_as<R, S>(store: &S, id: &str) -> Result<Option<R>, FetchError>
where
  R: Resource,
  S: ResourceStore + ?Sized,
{
  match store.read(R::TYPE, id).await? {
    Some(body) => Ok(Some(R::decode(body)?)),
    None => Ok(None),
  }
}
