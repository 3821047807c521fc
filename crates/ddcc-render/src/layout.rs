//! The structural content of a certificate, independent of PDF encoding.
//!
//! A [`CertificateLayout`] is a pure function of its inputs. PDF bytes are not
//! byte-stable (the encoder stamps a creation date and document id), so
//! comparisons of rendered certificates go through the layout.

use ddcc_core::{DoseRecord, VaccineClassification, datatype::HumanName, resource::Patient};

use crate::{Error, Result};

// ─── Page geometry (millimetres, origin bottom-left) ─────────────────────────

pub(crate) const PAGE_WIDTH: f32 = 210.0;
pub(crate) const PAGE_HEIGHT: f32 = 297.0;
pub(crate) const MARGIN: f32 = 20.0;

pub(crate) const LOGO_TOP: f32 = 277.0;
pub(crate) const LOGO_HEIGHT: f32 = 25.0;
pub(crate) const TITLE_Y: f32 = 242.0;
pub(crate) const ATTESTATION_Y: f32 = 228.0;
pub(crate) const LINE_HEIGHT: f32 = 6.0;
pub(crate) const CONTINUATION_HEADER_Y: f32 = 270.0;
pub(crate) const ROW_HEIGHT: f32 = 8.0;

pub(crate) const QR_SIZE: f32 = 40.0;
pub(crate) const QR_BOTTOM: f32 = 15.0;
/// Rows never go below this line; the QR code sits underneath.
pub(crate) const TABLE_FLOOR: f32 = QR_BOTTOM + QR_SIZE + 8.0;

/// Attestation wrap width in characters at the body font size.
const WRAP_COLUMNS: usize = 88;

pub const COLUMNS: [&str; 3] = ["Vaccine Name", "Dose Count", "Date Administered"];

const DATE_FORMAT: &str = "%d-%m-%Y";

// ─── Layout types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
  pub vaccine: String,
  pub dose:    String,
  pub date:    String,
}

/// The rows placed on one page, and where that page's table header sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlice {
  pub first_row: usize,
  pub row_count: usize,
  pub header_y:  f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateLayout {
  pub title:             String,
  pub attestation:       String,
  pub attestation_lines: Vec<String>,
  pub columns:           [&'static str; 3],
  pub rows:              Vec<TableRow>,
  pub pages:             Vec<PageSlice>,
  /// Exactly the verification URL.
  pub qr_payload:        String,
  pub has_logo:          bool,
}

impl CertificateLayout {
  pub fn compose(
    patient: &Patient,
    classification: &VaccineClassification,
    history: &[DoseRecord],
    verification_url: &str,
    country: &str,
    has_logo: bool,
  ) -> Result<Self> {
    if history.is_empty() {
      return Err(Error::NoDoseHistory);
    }

    let name = patient
      .names
      .first()
      .ok_or_else(|| Error::MalformedPatient("patient has no name".into()))?;
    let full_name = full_name(name)
      .ok_or_else(|| Error::MalformedPatient("patient name has no family or given part".into()))?;
    let birth_date = patient
      .birth_date
      .ok_or_else(|| Error::MalformedPatient("patient has no birth date".into()))?;
    let (id_type, id_value) = primary_identifier(patient)
      .ok_or_else(|| Error::MalformedPatient("patient has no identifier".into()))?;

    let (title, against) = if classification.is_routine {
      ("VACCINATION CERTIFICATE".to_owned(), "the following".to_owned())
    } else {
      (
        format!("{} VACCINATION CERTIFICATE", classification.display_name.to_uppercase()),
        classification.display_name.clone(),
      )
    };

    let attestation = format!(
      "This is to certify that {full_name}, born on {}, from {country} with {id_type}: \
       {id_value}, has been vaccinated against {against} on the date indicated in \
       accordance with the National Health Regulations.",
      birth_date.format(DATE_FORMAT),
    );
    let attestation_lines = wrap(&attestation, WRAP_COLUMNS);

    let rows: Vec<TableRow> = history
      .iter()
      .map(|dose| TableRow {
        vaccine: dose.vaccine_name.clone(),
        dose:    dose.dose_label(),
        date:    dose
          .occurred_on
          .map(|d| d.format(DATE_FORMAT).to_string())
          .unwrap_or_default(),
      })
      .collect();

    let first_header_y =
      ATTESTATION_Y - attestation_lines.len() as f32 * LINE_HEIGHT - ROW_HEIGHT;
    let pages = paginate(rows.len(), first_header_y);

    Ok(Self {
      title,
      attestation,
      attestation_lines,
      columns: COLUMNS,
      rows,
      pages,
      qr_payload: verification_url.to_owned(),
      has_logo,
    })
  }
}

/// `family given[0] [given[1]]`.
fn full_name(name: &HumanName) -> Option<String> {
  let parts: Vec<&str> = name
    .family
    .as_deref()
    .into_iter()
    .chain(name.given.iter().take(2).map(String::as_str))
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .collect();
  if parts.is_empty() {
    return name.text.clone().filter(|t| !t.trim().is_empty());
  }
  Some(parts.join(" "))
}

/// The first identifier that carries a value, with its printable type.
fn primary_identifier(patient: &Patient) -> Option<(String, String)> {
  patient.identifiers.iter().find_map(|id| {
    let value = id.value.as_deref()?.trim();
    if value.is_empty() {
      return None;
    }
    let kind = id.type_label().unwrap_or("Identifier");
    Some((kind.to_owned(), value.to_owned()))
  })
}

fn rows_fitting(header_y: f32) -> usize {
  (((header_y - TABLE_FLOOR) / ROW_HEIGHT).floor() as usize).max(1)
}

fn paginate(row_count: usize, first_header_y: f32) -> Vec<PageSlice> {
  let mut pages = Vec::new();
  let mut next = 0;
  let mut header_y = first_header_y;
  while next < row_count {
    let take = rows_fitting(header_y).min(row_count - next);
    pages.push(PageSlice {
      first_row: next,
      row_count: take,
      header_y,
    });
    next += take;
    header_y = CONTINUATION_HEADER_Y;
  }
  pages
}

/// Greedy word wrap.
fn wrap(text: &str, columns: usize) -> Vec<String> {
  let mut lines = Vec::new();
  let mut line = String::new();
  for word in text.split_whitespace() {
    if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > columns {
      lines.push(std::mem::take(&mut line));
    }
    if !line.is_empty() {
      line.push(' ');
    }
    line.push_str(word);
  }
  if !line.is_empty() {
    lines.push(line);
  }
  lines
}
