//! Certificate rendering: layout composition, QR encoding and PDF output.
//!
//! Rendering is synchronous and CPU-bound. Async callers should run
//! [`Renderer::render`] on a blocking thread.

mod assets;
mod error;
mod layout;
mod pdf;
mod qr;

use std::sync::Arc;

use ddcc_core::{DoseRecord, VaccineClassification, resource::Patient};

pub use assets::{RenderAssets, RenderConfig};
pub use error::{Error, Result};
pub use layout::{COLUMNS, CertificateLayout, PageSlice, TableRow};
pub use qr::QrMatrix;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A rendered certificate document.
#[derive(Debug, Clone)]
pub struct RenderedCertificate {
  pub layout:       CertificateLayout,
  pub bytes:        Vec<u8>,
  pub content_type: &'static str,
}

/// Renders certificates with assets loaded once at construction.
///
/// Cheap to clone; assets are shared behind an [`Arc`].
#[derive(Debug, Clone)]
pub struct Renderer {
  assets:  Arc<RenderAssets>,
  country: Arc<str>,
}

impl Renderer {
  pub fn new(config: &RenderConfig) -> Result<Self> {
    Ok(Self::with_assets(RenderAssets::load(config)?, &config.country))
  }

  pub fn with_assets(assets: RenderAssets, country: &str) -> Self {
    Self {
      assets:  Arc::new(assets),
      country: Arc::from(country),
    }
  }

  /// Compose the structural content without encoding a PDF.
  pub fn layout(
    &self,
    patient: &Patient,
    classification: &VaccineClassification,
    history: &[DoseRecord],
    verification_url: &str,
  ) -> Result<CertificateLayout> {
    CertificateLayout::compose(
      patient,
      classification,
      history,
      verification_url,
      &self.country,
      self.assets.logo_png.is_some(),
    )
  }

  pub fn render(
    &self,
    patient: &Patient,
    classification: &VaccineClassification,
    history: &[DoseRecord],
    verification_url: &str,
  ) -> Result<RenderedCertificate> {
    let layout = self.layout(patient, classification, history, verification_url)?;
    let qr = QrMatrix::encode(&layout.qr_payload)?;
    let bytes = pdf::encode(&layout, &qr, &self.assets)?;
    tracing::debug!(
      patient_id = %patient.id,
      rows = layout.rows.len(),
      pages = layout.pages.len(),
      bytes = bytes.len(),
      "rendered certificate"
    );
    Ok(RenderedCertificate {
      layout,
      bytes,
      content_type: PDF_CONTENT_TYPE,
    })
  }
}

#[cfg(test)]
mod tests;
