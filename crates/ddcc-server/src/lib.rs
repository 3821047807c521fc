//! HTTP surface of the DDCC certificate pipeline.
//!
//! Exposes an axum [`Router`] that triggers issuance, accepts FHIR rest-hook
//! notifications and serves the per-patient certificate folders, backed by
//! any [`ResourceStore`].

pub mod error;
pub mod handlers;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use ddcc_core::ResourceStore;
use ddcc_issuer::{Issuer, IssuerConfig, SubscriptionConfig};
use ddcc_render::RenderConfig;
use ddcc_store_fhir::FhirConfig;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{certificates, folders, health, subscriptions};

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

/// Which backend holds the FHIR resources.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
  Fhir(FhirConfig),
  /// Process-local tables, empty at startup.
  Memory,
}

impl StoreConfig {
  pub fn backend(&self) -> &'static str {
    match self {
      Self::Fhir(_) => "fhir",
      Self::Memory => "memory",
    }
  }
}

/// Runtime server configuration, deserialised from `config.toml` and the
/// `DDCC_` environment.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:         String,
  #[serde(default = "default_port")]
  pub port:         u16,
  pub store:        StoreConfig,
  #[serde(default)]
  pub issuer:       IssuerConfig,
  #[serde(default)]
  pub render:       RenderConfig,
  #[serde(default)]
  pub subscription: SubscriptionConfig,
  /// JSON catalog replacing the built-in vaccine table.
  #[serde(default)]
  pub catalog_file: Option<PathBuf>,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub issuer: Issuer<S>,
  pub config: Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      issuer: self.issuer.clone(),
      config: Arc::clone(&self.config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router<S>(state: AppState<S>) -> Router
where
  S: ResourceStore + 'static,
{
  Router::new()
    .route("/certificates/{immunization_id}",        post(certificates::issue::<S>))
    .route("/subscriptions",                         post(subscriptions::notify::<S>))
    .route("/folders/{patient_id}/{scope}",          get(folders::show::<S>))
    .route("/folders/{patient_id}/{scope}/resync",   post(folders::resync::<S>))
    .route("/health",                                get(health::handler::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
