//! Error type for `ddcc-render`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("no doses to certify")]
  NoDoseHistory,

  #[error("patient record cannot be rendered: {0}")]
  MalformedPatient(String),

  #[error("QR encoding failed: {0}")]
  Qr(String),

  #[error("PDF encoding failed: {0}")]
  Pdf(String),

  #[error("cannot load render asset {path}: {source}")]
  Asset {
    path:   String,
    source: std::io::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
