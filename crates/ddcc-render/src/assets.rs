//! Renderer configuration and the static assets it loads once at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

fn default_country() -> String { "Kenya".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
  /// Issuing country named in the attestation sentence.
  #[serde(default = "default_country")]
  pub country:      String,
  /// PNG printed above the title.
  #[serde(default)]
  pub logo:         Option<PathBuf>,
  /// TrueType faces; the builtin Helvetica pair is used when unset.
  #[serde(default)]
  pub font_regular: Option<PathBuf>,
  #[serde(default)]
  pub font_bold:    Option<PathBuf>,
}

impl Default for RenderConfig {
  fn default() -> Self {
    Self {
      country:      default_country(),
      logo:         None,
      font_regular: None,
      font_bold:    None,
    }
  }
}

/// Raw asset bytes. Shared read-only between renders.
#[derive(Debug, Clone, Default)]
pub struct RenderAssets {
  pub logo_png:     Option<Vec<u8>>,
  pub font_regular: Option<Vec<u8>>,
  pub font_bold:    Option<Vec<u8>>,
}

impl RenderAssets {
  pub fn load(config: &RenderConfig) -> Result<Self> {
    Ok(Self {
      logo_png:     read_optional(config.logo.as_deref())?,
      font_regular: read_optional(config.font_regular.as_deref())?,
      font_bold:    read_optional(config.font_bold.as_deref())?,
    })
  }
}

fn read_optional(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
  let Some(path) = path else {
    return Ok(None);
  };
  let bytes = std::fs::read(path).map_err(|source| Error::Asset {
    path: path.display().to_string(),
    source,
  })?;
  tracing::info!(path = %path.display(), bytes = bytes.len(), "loaded render asset");
  Ok(Some(bytes))
}
