//! One row of a certificate's dose table.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseRecord {
  pub immunization_id: String,
  pub vaccine_code:    String,
  pub vaccine_name:    String,
  pub dose_quantity:   Option<f64>,
  pub occurred_on:     Option<NaiveDate>,
}

impl DoseRecord {
  /// Dose count as printed: whole numbers without a decimal point, blank
  /// when unknown.
  pub fn dose_label(&self) -> String {
    match self.dose_quantity {
      Some(q) if q.fract() == 0.0 => format!("{}", q as i64),
      Some(q) => format!("{q}"),
      None => String::new(),
    }
  }
}
