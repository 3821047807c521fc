//! Builders for the FHIR resources one issuance writes.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::{DateTime, SecondsFormat, Utc};
use ddcc_core::{
  VaccineClassification, VaccineScope,
  resource::{Location, Patient},
};
use ddcc_render::RenderedCertificate;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::IssuerConfig;

pub(crate) const COMPOSITION_PROFILE: &str = "DigitalCertificateDocumentComposition";
pub(crate) const BUNDLE_PROFILE: &str = "DigitalCertificateDocumentBundle";
pub(crate) const DOCUMENT_REFERENCE_PROFILE: &str = "DigitalCertificateDocumentReference";
pub(crate) const FOLDER_PROFILE: &str = "DigitalCertificateDocumentFolder";
pub(crate) const ORGANIZATION_PROFILE: &str = "DigitalCertificateOrganization";

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn scope_display(scope: &VaccineScope, classification: Option<&VaccineClassification>) -> String {
  match (scope, classification) {
    (VaccineScope::Routine, _) => "Routine Immunizations".into(),
    (VaccineScope::NonRoutine(_), Some(c)) => c.display_name.clone(),
    (VaccineScope::NonRoutine(code), None) => code.clone(),
  }
}

/// The CodeableConcept carrying the scope key.
pub(crate) fn scope_concept(
  config: &IssuerConfig,
  scope: &VaccineScope,
  classification: Option<&VaccineClassification>,
) -> Value {
  json!({
    "coding": [{
      "system": config.coding_system,
      "code": scope.key(),
      "display": scope_display(scope, classification),
    }]
  })
}

/// Everything the builders need about one certificate being issued.
pub(crate) struct CertificateDraft<'a> {
  pub config:          &'a IssuerConfig,
  pub document_ref_id: &'a str,
  pub immunization_id: &'a str,
  pub patient:         &'a Patient,
  pub classification:  &'a VaccineClassification,
  pub issued_at:       DateTime<Utc>,
}

impl CertificateDraft<'_> {
  fn scope(&self) -> VaccineScope { self.classification.scope() }

  fn scope_type(&self) -> Value {
    scope_concept(self.config, &self.scope(), Some(self.classification))
  }

  fn title(&self) -> String {
    if self.classification.is_routine {
      "Routine Vaccination Certificate".into()
    } else {
      format!("{} Vaccination Certificate", self.classification.display_name)
    }
  }

  /// A snapshot of the issuing facility.
  pub fn organization(&self, location: &Location) -> Value {
    let mut org = json!({
      "resourceType": "Organization",
      "meta": { "profile": [self.config.profile(ORGANIZATION_PROFILE)] },
      "active": true,
      "name": location.name.clone().unwrap_or_else(|| format!("Location/{}", location.id)),
    });
    if let Some(obj) = org.as_object_mut() {
      if !location.identifiers.is_empty() {
        obj.insert("identifier".into(), json!(location.identifiers));
      }
      if !location.telecom.is_empty() {
        obj.insert("telecom".into(), json!(location.telecom));
      }
      if let Some(address) = &location.address {
        obj.insert("address".into(), json!([address]));
      }
    }
    org
  }

  pub fn composition(&self, organization_id: &str) -> Value {
    json!({
      "resourceType": "Composition",
      "meta": { "profile": [self.config.profile(COMPOSITION_PROFILE)] },
      "identifier": { "system": self.config.coding_system, "value": self.document_ref_id },
      "status": "final",
      "type": self.scope_type(),
      "subject": { "reference": format!("Patient/{}", self.patient.id) },
      "date": timestamp(self.issued_at),
      "author": [{ "reference": format!("Organization/{organization_id}") }],
      "title": self.title(),
      "attester": [{
        "mode": "official",
        "time": timestamp(self.issued_at),
        "party": { "reference": format!("Organization/{organization_id}") }
      }],
      "section": [{
        "title": self.classification.display_name,
        "code": { "coding": [{ "code": self.classification.vaccine_code }] },
        "focus": { "reference": format!("Immunization/{}", self.immunization_id) },
        "entry": [{ "reference": format!("Immunization/{}", self.immunization_id) }]
      }]
    })
  }

  pub fn binary(&self, rendered: &RenderedCertificate) -> Value {
    json!({
      "resourceType": "Binary",
      "contentType": rendered.content_type,
      "data": B64.encode(&rendered.bytes),
    })
  }

  /// The document bundle. `composition` and `organization` are the bodies as
  /// the store returned them.
  pub fn bundle(
    &self,
    composition: &Value,
    organization: &Value,
    binary_id: &str,
    content_type: &str,
  ) -> Value {
    let entry = |resource_type: &str, body: &Value| {
      let id = body.get("id").and_then(Value::as_str).unwrap_or_default();
      json!({ "fullUrl": format!("{resource_type}/{id}"), "resource": body })
    };
    json!({
      "resourceType": "Bundle",
      "meta": { "profile": [self.config.profile(BUNDLE_PROFILE)] },
      "identifier": { "system": self.config.coding_system, "value": self.document_ref_id },
      "type": "document",
      "timestamp": timestamp(self.issued_at),
      "entry": [
        entry("Composition", composition),
        entry("Patient", &self.patient.body),
        entry("Organization", organization),
        {
          "fullUrl": format!("Binary/{binary_id}"),
          "resource": { "resourceType": "Binary", "id": binary_id, "contentType": content_type }
        }
      ]
    })
  }

  pub fn document_reference(
    &self,
    organization_id: &str,
    binary_id: &str,
    bundle_id: &str,
    content_type: &str,
  ) -> Value {
    json!({
      "resourceType": "DocumentReference",
      "id": self.document_ref_id,
      "meta": { "profile": [self.config.profile(DOCUMENT_REFERENCE_PROFILE)] },
      "masterIdentifier": { "system": self.config.coding_system, "value": self.document_ref_id },
      "status": "current",
      "docStatus": "final",
      "type": self.scope_type(),
      "subject": { "reference": format!("Patient/{}", self.patient.id) },
      "date": timestamp(self.issued_at),
      "authenticator": { "reference": format!("Organization/{organization_id}") },
      "description": self.title(),
      "content": [
        {
          "attachment": {
            "contentType": content_type,
            "url": format!("Binary/{binary_id}"),
            "title": self.title(),
            "creation": timestamp(self.issued_at)
          }
        },
        {
          "attachment": {
            "contentType": "application/fhir+json",
            "url": format!("Bundle/{bundle_id}")
          }
        }
      ],
      "context": {
        "related": [{ "reference": format!("Immunization/{}", self.immunization_id) }]
      }
    })
  }
}

/// The id a FolderIndex is written under: the same for every call with the
/// same (patient, scope), and always a valid FHIR id.
pub(crate) fn folder_id(patient_id: &str, scope: &VaccineScope) -> String {
  let name = format!("urn:ddcc:folder:Patient/{patient_id}:{}", scope.key());
  Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// A FolderIndex `List` body listing `entries` (DocumentReference ids).
pub(crate) fn folder_list(
  config: &IssuerConfig,
  patient_id: &str,
  scope: &VaccineScope,
  entries: &[String],
) -> Value {
  json!({
    "resourceType": "List",
    "meta": { "profile": [config.profile(FOLDER_PROFILE)] },
    "status": "current",
    "mode": "working",
    "title": format!("Digital certificates ({})", scope.key()),
    "code": scope_concept(config, scope, None),
    "subject": { "reference": format!("Patient/{patient_id}") },
    "entry": folder_entries(entries),
  })
}

pub(crate) fn folder_entries(entries: &[String]) -> Value {
  Value::Array(
    entries
      .iter()
      .map(|id| json!({ "item": { "reference": format!("DocumentReference/{id}") } }))
      .collect(),
  )
}
