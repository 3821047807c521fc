//! Renderer behaviour through the public API.

use chrono::NaiveDate;
use ddcc_core::{
  DoseRecord, Resource, VaccineCatalog,
  resource::Patient,
};
use serde_json::json;

use crate::{Error, PDF_CONTENT_TYPE, RenderAssets, Renderer};

const URL: &str = "https://chanjoke.example/digital-certificates/doc-1/$validate";

fn patient() -> Patient {
  Patient::decode(json!({
    "resourceType": "Patient",
    "id": "p1",
    "name": [{ "family": "Otieno", "given": ["Amani", "Wanjiru"] }],
    "birthDate": "2023-01-15",
    "identifier": [{
      "type": { "coding": [{ "code": "BIRTH_CERTIFICATE", "display": "Birth Certificate" }] },
      "value": "BC-7781"
    }]
  }))
  .unwrap()
}

fn dose(id: &str, code: &str, name: &str, date: (i32, u32, u32)) -> DoseRecord {
  DoseRecord {
    immunization_id: id.into(),
    vaccine_code:    code.into(),
    vaccine_name:    name.into(),
    dose_quantity:   Some(1.0),
    occurred_on:     NaiveDate::from_ymd_opt(date.0, date.1, date.2),
  }
}

fn renderer() -> Renderer { Renderer::with_assets(RenderAssets::default(), "Kenya") }

#[test]
fn routine_certificate_lists_every_dose() {
  let catalog = VaccineCatalog::builtin();
  let classification = catalog.classify("IMDPT-1").unwrap();
  let history = vec![
    dose("e1", "IMBCG-I", "BCG", (2023, 1, 15)),
    dose("e2", "IMDPT-1", "DPT-HepB-Hib 1", (2023, 2, 26)),
  ];

  let out = renderer().render(&patient(), &classification, &history, URL).unwrap();
  assert_eq!(out.content_type, PDF_CONTENT_TYPE);
  assert!(out.bytes.starts_with(b"%PDF"));

  let layout = out.layout;
  assert_eq!(layout.title, "VACCINATION CERTIFICATE");
  assert!(layout.attestation.starts_with(
    "This is to certify that Otieno Amani Wanjiru, born on 15-01-2023, from Kenya with \
     Birth Certificate: BC-7781, has been vaccinated against the following on the date"
  ));
  assert_eq!(layout.columns, ["Vaccine Name", "Dose Count", "Date Administered"]);
  assert_eq!(layout.rows.len(), 2);
  assert_eq!(layout.rows[1].vaccine, "DPT-HepB-Hib 1");
  assert_eq!(layout.rows[1].dose, "1");
  assert_eq!(layout.rows[1].date, "26-02-2023");
  assert_eq!(layout.qr_payload, URL);
}

#[test]
fn non_routine_certificate_names_the_vaccine() {
  let catalog = VaccineCatalog::builtin();
  let classification = catalog.classify("16927").unwrap();
  let history = vec![dose("e9", "16927", "Covid 19 Astrazeneca", (2024, 5, 2))];

  let layout = renderer()
    .layout(&patient(), &classification, &history, URL)
    .unwrap();
  assert_eq!(layout.title, "COVID 19 ASTRAZENECA VACCINATION CERTIFICATE");
  assert!(layout.attestation.contains("vaccinated against Covid 19 Astrazeneca on the date"));
}

#[test]
fn layout_is_deterministic_for_equal_inputs() {
  let catalog = VaccineCatalog::builtin();
  let classification = catalog.classify("IMBCG-I").unwrap();
  let history = vec![dose("e1", "IMBCG-I", "BCG", (2023, 1, 15))];
  let r = renderer();

  let a = r.render(&patient(), &classification, &history, URL).unwrap();
  let b = r.render(&patient(), &classification, &history, URL).unwrap();
  assert_eq!(a.layout, b.layout);
}

#[test]
fn empty_history_is_rejected() {
  let classification = VaccineCatalog::builtin().classify("IMBCG-I").unwrap();
  let err = renderer()
    .render(&patient(), &classification, &[], URL)
    .unwrap_err();
  assert!(matches!(err, Error::NoDoseHistory));
}

#[test]
fn patient_without_name_is_malformed() {
  let mut p = patient();
  p.names.clear();
  let classification = VaccineCatalog::builtin().classify("IMBCG-I").unwrap();
  let history = vec![dose("e1", "IMBCG-I", "BCG", (2023, 1, 15))];
  let err = renderer().render(&p, &classification, &history, URL).unwrap_err();
  assert!(matches!(err, Error::MalformedPatient(_)));
}

#[test]
fn patient_without_birth_date_or_identifier_is_malformed() {
  let classification = VaccineCatalog::builtin().classify("IMBCG-I").unwrap();
  let history = vec![dose("e1", "IMBCG-I", "BCG", (2023, 1, 15))];

  let mut no_dob = patient();
  no_dob.birth_date = None;
  assert!(matches!(
    renderer().layout(&no_dob, &classification, &history, URL),
    Err(Error::MalformedPatient(_))
  ));

  let mut no_id = patient();
  no_id.identifiers.clear();
  assert!(matches!(
    renderer().layout(&no_id, &classification, &history, URL),
    Err(Error::MalformedPatient(_))
  ));
}

#[test]
fn long_history_continues_on_extra_pages() {
  let classification = VaccineCatalog::builtin().classify("IMBCG-I").unwrap();
  let history: Vec<DoseRecord> = (0..60)
    .map(|i| dose(&format!("e{i}"), "IMBCG-I", "BCG", (2023, 1, 1 + (i % 28) as u32)))
    .collect();

  let out = renderer().render(&patient(), &classification, &history, URL).unwrap();
  let pages = &out.layout.pages;
  assert!(pages.len() >= 2);
  assert_eq!(pages.iter().map(|p| p.row_count).sum::<usize>(), 60);
  for pair in pages.windows(2) {
    assert_eq!(pair[0].first_row + pair[0].row_count, pair[1].first_row);
  }
}
