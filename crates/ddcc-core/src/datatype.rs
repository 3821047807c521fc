//! FHIR complex datatypes shared by the resources the pipeline reads and
//! writes.
//!
//! Only the elements the pipeline actually touches are modelled. Unknown
//! elements are ignored on decode; the untouched JSON is kept on the
//! resources that must be copied verbatim into a document bundle.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::resource::ResourceType;

// ─── Reference ───────────────────────────────────────────────────────────────

/// A literal reference such as `Patient/123`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reference: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display:   Option<String>,
}

impl Reference {
  /// Extract the logical id when this reference points at `resource_type`.
  ///
  /// Accepts relative (`Patient/1`), absolute (`https://x/fhir/Patient/1`)
  /// and versioned (`Patient/1/_history/3`) forms.
  pub fn id_for(&self, resource_type: ResourceType) -> Option<&str> {
    let reference = self.reference.as_deref()?;
    let mut segments = reference.split('/');
    while let Some(segment) = segments.next() {
      if segment == resource_type.as_str() {
        return segments.next().filter(|id| !id.is_empty());
      }
    }
    None
  }

  /// True if this reference names `{resource_type}/{id}` in any accepted form.
  pub fn points_to(&self, resource_type: ResourceType, id: &str) -> bool {
    self.id_for(resource_type) == Some(id)
  }
}

// ─── Coding / CodeableConcept ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub system:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display: Option<String>,
}

impl Coding {
  pub fn new(system: &str, code: &str, display: Option<&str>) -> Self {
    Self {
      system:  Some(system.to_owned()),
      code:    Some(code.to_owned()),
      display: display.map(str::to_owned),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeableConcept {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub coding: Vec<Coding>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text:   Option<String>,
}

impl CodeableConcept {
  /// The code of the first coding that carries one.
  pub fn first_code(&self) -> Option<&str> {
    self.coding.iter().find_map(|c| c.code.as_deref())
  }

  /// Human-readable label: `text`, else the first coding display or code.
  pub fn label(&self) -> Option<&str> {
    self.text.as_deref().or_else(|| {
      self
        .coding
        .iter()
        .find_map(|c| c.display.as_deref().or(c.code.as_deref()))
    })
  }
}

// ─── Identifier ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind:   Option<CodeableConcept>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub system: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value:  Option<String>,
}

impl Identifier {
  /// The identifier type as printed on a certificate (e.g. `NATIONAL_ID`).
  ///
  /// Falls back to the identifier system when no type is coded.
  pub fn type_label(&self) -> Option<&str> {
    self
      .kind
      .as_ref()
      .and_then(CodeableConcept::label)
      .or(self.system.as_deref())
  }
}

// ─── HumanName ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanName {
  #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
  pub use_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub family:   Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub given:    Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text:     Option<String>,
}

// ─── Quantity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub unit:  Option<String>,
}

// ─── Dates ───────────────────────────────────────────────────────────────────

/// Parse the calendar date out of a FHIR `date` or `dateTime` value.
///
/// The date is taken as written, in the offset the value carries; partial
/// dates (`2024`, `2024-05`) yield `None`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
  let value = value.trim();
  if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
    return Some(date);
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.date_naive());
  }
  value
    .get(..10)
    .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reference_id_for_relative_absolute_and_versioned() {
    let r = |s: &str| Reference {
      reference: Some(s.to_owned()),
      display:   None,
    };
    assert_eq!(r("Patient/p1").id_for(ResourceType::Patient), Some("p1"));
    assert_eq!(
      r("https://fhir.example/fhir/Patient/p2").id_for(ResourceType::Patient),
      Some("p2")
    );
    assert_eq!(
      r("Patient/p3/_history/4").id_for(ResourceType::Patient),
      Some("p3")
    );
    assert_eq!(r("Location/l1").id_for(ResourceType::Patient), None);
    assert_eq!(r("Patient/").id_for(ResourceType::Patient), None);
    assert_eq!(Reference::default().id_for(ResourceType::Patient), None);
  }

  #[test]
  fn parse_date_accepts_dates_and_datetimes() {
    let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    assert_eq!(parse_date("2024-03-09"), Some(d));
    assert_eq!(parse_date("2024-03-09T23:30:00+03:00"), Some(d));
    assert_eq!(parse_date("2024-03-09T10:00:00.000Z"), Some(d));
    assert_eq!(parse_date("2024-03"), None);
    assert_eq!(parse_date("not a date"), None);
  }

  #[test]
  fn identifier_label_prefers_type_then_system() {
    let typed = Identifier {
      kind:   Some(CodeableConcept {
        coding: vec![Coding::new("urn:id-types", "NATIONAL_ID", Some("National ID"))],
        text:   None,
      }),
      system: Some("urn:system".into()),
      value:  Some("123".into()),
    };
    assert_eq!(typed.type_label(), Some("National ID"));

    let untyped = Identifier {
      kind:   None,
      system: Some("urn:system".into()),
      value:  Some("123".into()),
    };
    assert_eq!(untyped.type_label(), Some("urn:system"));
  }
}
