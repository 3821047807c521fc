//! `OperationOutcome`: the structured failure body FHIR servers return.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datatype::CodeableConcept;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
  pub severity:    String,
  pub code:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details:     Option<CodeableConcept>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub diagnostics: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub expression:  Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
  pub resource_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id:            Option<String>,
  #[serde(default)]
  pub issue:         Vec<Issue>,
}

impl OperationOutcome {
  /// A single-issue outcome with `severity = error`.
  pub fn error(code: &str, text: impl Into<String>) -> Self {
    Self {
      resource_type: "OperationOutcome".into(),
      id:            None,
      issue:         vec![Issue {
        severity:    "error".into(),
        code:        code.into(),
        details:     Some(CodeableConcept {
          coding: Vec::new(),
          text:   Some(text.into()),
        }),
        diagnostics: None,
        expression:  Vec::new(),
      }],
    }
  }

  /// Recognise an outcome body. Returns `None` for any other resource.
  pub fn from_body(body: &Value) -> Option<Self> {
    if !is_outcome(body) {
      return None;
    }
    serde_json::from_value(body.clone()).ok()
  }

  /// One-line human-readable summary of all issues.
  pub fn summary(&self) -> String {
    let parts: Vec<String> = self
      .issue
      .iter()
      .map(|i| {
        let text = i
          .details
          .as_ref()
          .and_then(|d| d.text.as_deref())
          .or(i.diagnostics.as_deref())
          .unwrap_or("no details");
        format!("{} ({}): {}", i.severity, i.code, text)
      })
      .collect();
    if parts.is_empty() {
      "operation outcome without issues".into()
    } else {
      parts.join("; ")
    }
  }
}

/// True if `body` is an `OperationOutcome` resource.
pub fn is_outcome(body: &Value) -> bool {
  body.get("resourceType").and_then(Value::as_str) == Some("OperationOutcome")
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn from_body_only_matches_outcomes() {
    let outcome = json!({
      "resourceType": "OperationOutcome",
      "issue": [{ "severity": "error", "code": "not-found", "diagnostics": "Resource Patient/x is not known" }]
    });
    let parsed = OperationOutcome::from_body(&outcome).unwrap();
    assert_eq!(parsed.issue[0].code, "not-found");
    assert_eq!(
      parsed.summary(),
      "error (not-found): Resource Patient/x is not known"
    );

    assert!(OperationOutcome::from_body(&json!({ "resourceType": "Patient" })).is_none());
  }

  #[test]
  fn error_outcome_serialises_like_a_fhir_resource() {
    let body = serde_json::to_value(OperationOutcome::error("exception", "boom")).unwrap();
    assert_eq!(body["resourceType"], "OperationOutcome");
    assert_eq!(body["issue"][0]["details"]["text"], "boom");
  }
}
