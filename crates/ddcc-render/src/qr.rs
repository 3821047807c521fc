//! QR encoding of the verification URL.

use qrcode::{Color, QrCode};

use crate::{Error, Result};

/// A square module matrix, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
  width:   usize,
  modules: Vec<bool>,
}

impl QrMatrix {
  pub fn encode(payload: &str) -> Result<Self> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| Error::Qr(e.to_string()))?;
    let width = code.width();
    let modules = code
      .to_colors()
      .into_iter()
      .map(|c| c == Color::Dark)
      .collect();
    Ok(Self { width, modules })
  }

  pub fn width(&self) -> usize { self.width }

  pub fn is_dark(&self, x: usize, y: usize) -> bool {
    x < self.width && y < self.width && self.modules[y * self.width + x]
  }

  /// Horizontal runs of dark modules per row as `(row, start, len)`.
  pub fn dark_runs(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
    (0..self.width).flat_map(move |y| {
      let mut runs = Vec::new();
      let mut x = 0;
      while x < self.width {
        if self.is_dark(x, y) {
          let start = x;
          while x < self.width && self.is_dark(x, y) {
            x += 1;
          }
          runs.push((y, start, x - start));
        } else {
          x += 1;
        }
      }
      runs
    })
  }
}
