//! Search parameter evaluation over raw JSON bodies.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveTime, Utc};
use ddcc_core::{ResourceType, SearchQuery, StoreError, datatype::parse_date};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortOrder {
  Ascending,
  Descending,
}

/// A validated query: filters to apply plus an optional date sort.
#[derive(Debug)]
pub(crate) struct Plan<'q> {
  filters: Vec<(&'q str, &'q str)>,
  pub sort: Option<SortOrder>,
}

impl<'q> Plan<'q> {
  pub fn compile(query: &'q SearchQuery) -> Result<Self, StoreError> {
    let mut plan = Plan {
      filters: Vec::new(),
      sort:    None,
    };
    for (name, value) in query.params() {
      match name.as_str() {
        "subject" | "patient" | "type" | "code" | "vaccine-code" => {
          plan.filters.push((name.as_str(), value.as_str()));
        }
        "_sort" => {
          plan.sort = Some(match value.as_str() {
            "date" => SortOrder::Ascending,
            "-date" => SortOrder::Descending,
            other => {
              return Err(StoreError::rejected(
                400,
                "not-supported",
                format!("unsupported sort: {other}"),
              ));
            }
          });
        }
        "_count" => {}
        other => {
          return Err(StoreError::rejected(
            400,
            "not-supported",
            format!("unknown search parameter: {other}"),
          ));
        }
      }
    }
    Ok(plan)
  }

  pub fn matches(&self, body: &Value) -> bool {
    self.filters.iter().all(|(name, value)| match *name {
      "subject" => reference_matches(body.get("subject"), value),
      "patient" => {
        reference_matches(body.get("patient"), value)
          || reference_matches(body.get("subject"), value)
      }
      "type" => token_matches(body.get("type"), value),
      "code" => token_matches(body.get("code"), value),
      "vaccine-code" => token_matches(body.get("vaccineCode"), value),
      _ => false,
    })
  }
}

/// Compare a reference element with a search value. The value may be a bare
/// id or a `Type/id` reference.
fn reference_matches(element: Option<&Value>, wanted: &str) -> bool {
  let Some(reference) = element
    .and_then(|e| e.get("reference"))
    .and_then(Value::as_str)
  else {
    return false;
  };
  let (have_type, have_id) = type_and_id(reference);
  match wanted.split_once('/') {
    Some((t, id)) => have_type == Some(t) && have_id == Some(id),
    None => have_id == Some(wanted),
  }
}

/// The `Type/id` pair of a relative, absolute or versioned reference.
fn type_and_id(reference: &str) -> (Option<&str>, Option<&str>) {
  let trimmed = match reference.find("/_history/") {
    Some(i) => &reference[..i],
    None => reference,
  };
  let mut segments = trimmed.rsplit('/');
  let id = segments.next().filter(|s| !s.is_empty());
  let rtype = segments.next();
  (rtype, id)
}

/// Token match against a CodeableConcept. Accepts `code` or `system|code`.
fn token_matches(element: Option<&Value>, wanted: &str) -> bool {
  let Some(codings) = element
    .and_then(|e| e.get("coding"))
    .and_then(Value::as_array)
  else {
    return false;
  };
  let (system, code) = match wanted.split_once('|') {
    Some((s, c)) => (Some(s).filter(|s| !s.is_empty()), c),
    None => (None, wanted),
  };
  codings.iter().any(|coding| {
    coding.get("code").and_then(Value::as_str) == Some(code)
      && system.is_none_or(|s| coding.get("system").and_then(Value::as_str) == Some(s))
  })
}

/// The value the `date` search parameter targets for each resource type.
fn date_of(resource_type: ResourceType, body: &Value) -> Option<DateTime<Utc>> {
  let field = match resource_type {
    ResourceType::Immunization => "occurrenceDateTime",
    _ => "date",
  };
  let raw = body.get(field)?.as_str()?;
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  parse_date(raw).map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Stable sort by date; resources without a date sort last.
pub(crate) fn sort_by_date(resource_type: ResourceType, bodies: &mut [Value], order: SortOrder) {
  bodies.sort_by(|a, b| {
    match (date_of(resource_type, a), date_of(resource_type, b)) {
      (Some(x), Some(y)) => match order {
        SortOrder::Ascending => x.cmp(&y),
        SortOrder::Descending => y.cmp(&x),
      },
      (Some(_), None) => Ordering::Less,
      (None, Some(_)) => Ordering::Greater,
      (None, None) => Ordering::Equal,
    }
  });
}
