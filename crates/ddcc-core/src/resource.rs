//! Typed views of the FHIR resources the pipeline consumes.
//!
//! Stores deal in raw JSON bodies. Everything the pipeline reads goes through
//! [`Resource::decode`], which checks `resourceType` and turns missing
//! required elements into [`Error::MissingField`] instead of letting an
//! absent value travel further.

use std::{fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
  Error, Result,
  datatype::{
    CodeableConcept, HumanName, Identifier, Quantity, Reference, parse_date,
  },
};

// ─── ResourceType ────────────────────────────────────────────────────────────

/// Resource types the pipeline addresses in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
  Binary,
  Bundle,
  Composition,
  DocumentReference,
  Immunization,
  List,
  Location,
  OperationOutcome,
  Organization,
  Patient,
  Subscription,
}

impl ResourceType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Binary => "Binary",
      Self::Bundle => "Bundle",
      Self::Composition => "Composition",
      Self::DocumentReference => "DocumentReference",
      Self::Immunization => "Immunization",
      Self::List => "List",
      Self::Location => "Location",
      Self::OperationOutcome => "OperationOutcome",
      Self::Organization => "Organization",
      Self::Patient => "Patient",
      Self::Subscription => "Subscription",
    }
  }
}

impl fmt::Display for ResourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ResourceType {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    Ok(match s {
      "Binary" => Self::Binary,
      "Bundle" => Self::Bundle,
      "Composition" => Self::Composition,
      "DocumentReference" => Self::DocumentReference,
      "Immunization" => Self::Immunization,
      "List" => Self::List,
      "Location" => Self::Location,
      "OperationOutcome" => Self::OperationOutcome,
      "Organization" => Self::Organization,
      "Patient" => Self::Patient,
      "Subscription" => Self::Subscription,
      other => return Err(format!("unsupported resource type: {other}")),
    })
  }
}

// ─── Resource trait ──────────────────────────────────────────────────────────

/// A typed resource decoded from a raw store body.
pub trait Resource: Sized {
  const TYPE: ResourceType;

  fn decode(body: Value) -> Result<Self>;
}

/// Check `resourceType` and deserialise the wire struct.
fn decode_wire<W: DeserializeOwned>(expected: ResourceType, body: &Value) -> Result<W> {
  let found = body.get("resourceType").and_then(Value::as_str);
  if found != Some(expected.as_str()) {
    return Err(Error::WrongResourceType {
      expected,
      found: found.map(str::to_owned),
    });
  }
  Ok(serde_json::from_value(body.clone())?)
}

fn require<T>(value: Option<T>, resource_type: ResourceType, field: &'static str) -> Result<T> {
  value.ok_or(Error::MissingField {
    resource_type,
    field,
  })
}

/// The logical id assigned by the store, if any.
pub fn body_id(body: &Value) -> Option<&str> {
  body.get("id").and_then(Value::as_str)
}

// ─── Patient ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientWire {
  id:         Option<String>,
  #[serde(default)]
  name:       Vec<HumanName>,
  birth_date: Option<String>,
  #[serde(default)]
  identifier: Vec<Identifier>,
}

/// A patient as the certificate needs it. `body` keeps the full resource for
/// embedding in the document bundle.
#[derive(Debug, Clone)]
pub struct Patient {
  pub id:          String,
  pub names:       Vec<HumanName>,
  pub birth_date:  Option<NaiveDate>,
  pub identifiers: Vec<Identifier>,
  pub body:        Value,
}

impl Resource for Patient {
  const TYPE: ResourceType = ResourceType::Patient;

  fn decode(body: Value) -> Result<Self> {
    let wire: PatientWire = decode_wire(Self::TYPE, &body)?;
    let birth_date = match wire.birth_date {
      Some(raw) => Some(parse_date(&raw).ok_or(Error::InvalidField {
        resource_type: Self::TYPE,
        field:         "birthDate",
        value:         raw,
      })?),
      None => None,
    };
    Ok(Self {
      id: require(wire.id, Self::TYPE, "id")?,
      names: wire.name,
      birth_date,
      identifiers: wire.identifier,
      body,
    })
  }
}

// ─── Immunization ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImmunizationWire {
  id:                  Option<String>,
  status:              Option<String>,
  vaccine_code:        Option<CodeableConcept>,
  patient:             Option<Reference>,
  // Some registries put the patient under `subject`.
  subject:             Option<Reference>,
  occurrence_date_time: Option<String>,
  dose_quantity:       Option<Quantity>,
  location:            Option<Reference>,
}

/// One administered dose.
#[derive(Debug, Clone)]
pub struct Immunization {
  pub id:            String,
  pub status:        Option<String>,
  pub vaccine_code:  CodeableConcept,
  pub patient:       Option<Reference>,
  pub occurrence:    Option<String>,
  pub dose_quantity: Option<Quantity>,
  pub location:      Option<Reference>,
}

impl Immunization {
  pub fn patient_id(&self) -> Option<&str> {
    self.patient.as_ref()?.id_for(ResourceType::Patient)
  }

  pub fn vaccine_code(&self) -> Option<&str> { self.vaccine_code.first_code() }

  pub fn location_id(&self) -> Option<&str> {
    self.location.as_ref()?.id_for(ResourceType::Location)
  }

  pub fn occurred_on(&self) -> Option<NaiveDate> {
    self.occurrence.as_deref().and_then(parse_date)
  }

  /// Events that record a dose that was never given.
  pub fn is_void(&self) -> bool {
    matches!(self.status.as_deref(), Some("entered-in-error" | "not-done"))
  }
}

impl Resource for Immunization {
  const TYPE: ResourceType = ResourceType::Immunization;

  fn decode(body: Value) -> Result<Self> {
    let wire: ImmunizationWire = decode_wire(Self::TYPE, &body)?;
    Ok(Self {
      id:            require(wire.id, Self::TYPE, "id")?,
      status:        wire.status,
      vaccine_code:  wire.vaccine_code.unwrap_or_default(),
      patient:       wire.patient.or(wire.subject),
      occurrence:    wire.occurrence_date_time,
      dose_quantity: wire.dose_quantity,
      location:      wire.location,
    })
  }
}

// ─── Location ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LocationWire {
  id:         Option<String>,
  name:       Option<String>,
  #[serde(default)]
  identifier: Vec<Identifier>,
  #[serde(default)]
  telecom:    Vec<Value>,
  address:    Option<Value>,
}

/// The facility where a dose was given.
#[derive(Debug, Clone)]
pub struct Location {
  pub id:          String,
  pub name:        Option<String>,
  pub identifiers: Vec<Identifier>,
  pub telecom:     Vec<Value>,
  pub address:     Option<Value>,
}

impl Resource for Location {
  const TYPE: ResourceType = ResourceType::Location;

  fn decode(body: Value) -> Result<Self> {
    let wire: LocationWire = decode_wire(Self::TYPE, &body)?;
    Ok(Self {
      id:          require(wire.id, Self::TYPE, "id")?,
      name:        wire.name,
      identifiers: wire.identifier,
      telecom:     wire.telecom,
      address:     wire.address,
    })
  }
}

// ─── Composition ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompositionSectionWire {
  focus: Option<Reference>,
}

#[derive(Debug, Deserialize)]
struct CompositionWire {
  id:      Option<String>,
  subject: Option<Reference>,
  #[serde(default)]
  section: Vec<CompositionSectionWire>,
}

/// The parts of an issued Composition the dedup check inspects.
#[derive(Debug, Clone)]
pub struct Composition {
  pub id:      String,
  pub subject: Option<Reference>,
  pub focuses: Vec<Reference>,
}

impl Composition {
  /// True if any section is focused on `Immunization/{immunization_id}`.
  pub fn certifies(&self, immunization_id: &str) -> bool {
    self
      .focuses
      .iter()
      .any(|f| f.points_to(ResourceType::Immunization, immunization_id))
  }
}

impl Resource for Composition {
  const TYPE: ResourceType = ResourceType::Composition;

  fn decode(body: Value) -> Result<Self> {
    let wire: CompositionWire = decode_wire(Self::TYPE, &body)?;
    Ok(Self {
      id:      require(wire.id, Self::TYPE, "id")?,
      subject: wire.subject,
      focuses: wire.section.into_iter().filter_map(|s| s.focus).collect(),
    })
  }
}

// ─── DocumentReference ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DocumentReferenceWire {
  id:   Option<String>,
  date: Option<String>,
}

/// An issued certificate's metadata, as far as folder ordering needs it.
#[derive(Debug, Clone)]
pub struct DocumentReference {
  pub id:   String,
  pub date: Option<DateTime<FixedOffset>>,
}

impl Resource for DocumentReference {
  const TYPE: ResourceType = ResourceType::DocumentReference;

  fn decode(body: Value) -> Result<Self> {
    let wire: DocumentReferenceWire = decode_wire(Self::TYPE, &body)?;
    Ok(Self {
      id:   require(wire.id, Self::TYPE, "id")?,
      date: wire
        .date
        .as_deref()
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok()),
    })
  }
}

// ─── FolderIndex (List) ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListEntryWire {
  item: Option<Reference>,
}

#[derive(Debug, Deserialize)]
struct MetaWire {
  #[serde(rename = "versionId")]
  version_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListWire {
  id:      Option<String>,
  meta:    Option<MetaWire>,
  subject: Option<Reference>,
  code:    Option<CodeableConcept>,
  #[serde(default)]
  entry:   Vec<ListEntryWire>,
}

/// The per-(patient, scope) index of issued certificate documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderIndex {
  pub id:         String,
  pub version_id: Option<String>,
  pub patient_id: String,
  pub scope:      String,
  /// `DocumentReference/{id}` references, in folder order.
  pub entries:    Vec<String>,
}

impl FolderIndex {
  /// Ids of the DocumentReferences listed in this folder.
  pub fn document_ids(&self) -> Vec<&str> {
    self
      .entries
      .iter()
      .filter_map(|e| e.strip_prefix("DocumentReference/"))
      .collect()
  }
}

impl Resource for FolderIndex {
  const TYPE: ResourceType = ResourceType::List;

  fn decode(body: Value) -> Result<Self> {
    let wire: ListWire = decode_wire(Self::TYPE, &body)?;
    let subject = require(wire.subject, Self::TYPE, "subject")?;
    let patient_id = require(
      subject.id_for(ResourceType::Patient).map(str::to_owned),
      Self::TYPE,
      "subject",
    )?;
    let scope = require(
      wire
        .code
        .as_ref()
        .and_then(CodeableConcept::first_code)
        .map(str::to_owned),
      Self::TYPE,
      "code",
    )?;
    Ok(Self {
      id: require(wire.id, Self::TYPE, "id")?,
      version_id: wire.meta.and_then(|m| m.version_id),
      patient_id,
      scope,
      entries: wire
        .entry
        .into_iter()
        .filter_map(|e| e.item.and_then(|i| i.reference))
        .collect(),
    })
  }
}
