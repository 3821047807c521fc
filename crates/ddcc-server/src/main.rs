//! ddcc-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered under
//! `DDCC_`-prefixed environment variables, connects to the configured store,
//! registers the rest-hook subscription and serves the pipeline over HTTP.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `DDCC_STORE__BASE_URL=http://hapi:8080/fhir`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use ddcc_core::{ResourceStore, VaccineCatalog};
use ddcc_issuer::{Issuer, upsert_subscription};
use ddcc_render::Renderer;
use ddcc_server::{AppState, ServerConfig, StoreConfig};
use ddcc_store_fhir::FhirStore;
use ddcc_store_memory::MemoryStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "DDCC vaccination certificate server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("DDCC")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let catalog = match &server_cfg.catalog_file {
    Some(path) => VaccineCatalog::from_json_file(path)
      .with_context(|| format!("failed to load vaccine catalog from {path:?}"))?,
    None => VaccineCatalog::builtin(),
  };
  tracing::info!(vaccines = catalog.len(), "vaccine catalog loaded");

  let renderer = Renderer::new(&server_cfg.render).context("failed to load render assets")?;

  match server_cfg.store.clone() {
    StoreConfig::Fhir(fhir) => {
      let store = FhirStore::new(&fhir).context("failed to build FHIR client")?;
      tracing::info!(base_url = %fhir.base_url, "using FHIR store");
      serve(store, server_cfg, catalog, renderer).await
    }
    StoreConfig::Memory => {
      tracing::warn!("using in-memory store; nothing is persisted");
      serve(MemoryStore::new(), server_cfg, catalog, renderer).await
    }
  }
}

async fn serve<S>(
  store: S,
  server_cfg: ServerConfig,
  catalog: VaccineCatalog,
  renderer: Renderer,
) -> anyhow::Result<()>
where
  S: ResourceStore + 'static,
{
  let store = Arc::new(store);

  if let Err(error) = upsert_subscription(
    &*store,
    &server_cfg.subscription,
    server_cfg.issuer.store_timeout(),
  )
  .await
  {
    tracing::error!(%error, "failed to register subscription");
  }

  let issuer = Issuer::new(
    store,
    Arc::new(catalog),
    renderer,
    server_cfg.issuer.clone(),
  );
  let state = AppState {
    issuer,
    config: Arc::new(server_cfg.clone()),
  };

  let app = ddcc_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
