//! End-to-end pipeline behaviour against the in-memory store.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use ddcc_core::{ResourceType, StoreError, VaccineCatalog, VaccineScope};
use ddcc_render::{RenderAssets, Renderer};
use ddcc_store_memory::{Fault, MemoryStore, Op};
use serde_json::{Value, json};

use crate::{
  IssuanceError, IssuanceStatus, Issuer, IssuerConfig, OutcomeKind, ResourceKey, Step,
  SubscriptionConfig, history::load_dose_history, upsert_subscription,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn patient() -> Value {
  json!({
    "resourceType": "Patient",
    "id": "p1",
    "name": [{ "family": "Otieno", "given": ["Amani"] }],
    "birthDate": "2023-01-15",
    "identifier": [{
      "type": { "coding": [{ "code": "BIRTH_CERTIFICATE", "display": "Birth Certificate" }] },
      "value": "BC-7781"
    }]
  })
}

fn location() -> Value {
  json!({
    "resourceType": "Location",
    "id": "loc1",
    "name": "Kisumu County Hospital",
    "identifier": [{ "system": "mfl", "value": "13939" }]
  })
}

fn immunization(id: &str, code: &str, date: &str) -> Value {
  json!({
    "resourceType": "Immunization",
    "id": id,
    "status": "completed",
    "vaccineCode": { "coding": [{ "code": code }] },
    "patient": { "reference": "Patient/p1" },
    "occurrenceDateTime": date,
    "location": { "reference": "Location/loc1" },
    "doseQuantity": { "value": 1 }
  })
}

/// p1 with a BCG dose, a DPT dose and a Covid dose.
fn seeded() -> MemoryStore {
  let store = MemoryStore::new();
  store.seed(patient()).unwrap();
  store.seed(location()).unwrap();
  store.seed(immunization("e1", "IMBCG-I", "2023-01-15")).unwrap();
  store.seed(immunization("e2", "IMDPT-1", "2023-02-26")).unwrap();
  store.seed(immunization("e3", "16927", "2023-03-10")).unwrap();
  store
}

fn issuer_with(store: &MemoryStore, config: IssuerConfig) -> Issuer<MemoryStore> {
  Issuer::new(
    Arc::new(store.clone()),
    Arc::new(VaccineCatalog::builtin()),
    Renderer::with_assets(RenderAssets::default(), "Kenya"),
    config,
  )
}

fn issuer(store: &MemoryStore) -> Issuer<MemoryStore> { issuer_with(store, IssuerConfig::default()) }

fn issued_id(status: &IssuanceStatus) -> &str {
  match status {
    IssuanceStatus::Issued { document_ref_id } => document_ref_id,
    other => panic!("expected Issued, got {other:?}"),
  }
}

fn stored(store: &MemoryStore, resource_type: ResourceType, id: &str) -> Value {
  store
    .all(resource_type)
    .into_iter()
    .find(|b| b["id"] == id)
    .unwrap()
}

fn writes(store: &MemoryStore) -> usize { store.total(Op::Create) + store.total(Op::Update) }

// ─── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn routine_issuance_writes_the_document_set_and_folder() {
  let store = seeded();
  let out = issuer(&store).issue_certificate("e2").await.unwrap();
  let doc_id = issued_id(&out.status).to_owned();

  for rt in [
    ResourceType::Organization,
    ResourceType::Composition,
    ResourceType::Binary,
    ResourceType::Bundle,
  ] {
    assert_eq!(store.count(Op::Create, rt), 1, "{rt}");
  }
  assert_eq!(store.count(Op::Update, ResourceType::DocumentReference), 1);

  let doc = stored(&store, ResourceType::DocumentReference, &doc_id);
  assert_eq!(doc["type"]["coding"][0]["code"], "routine");
  assert_eq!(doc["subject"]["reference"], "Patient/p1");

  let comp = &store.all(ResourceType::Composition)[0];
  assert_eq!(comp["section"][0]["focus"]["reference"], "Immunization/e2");

  let binary = &store.all(ResourceType::Binary)[0];
  assert_eq!(binary["contentType"], "application/pdf");
  let pdf = B64.decode(binary["data"].as_str().unwrap()).unwrap();
  assert!(pdf.starts_with(b"%PDF"));

  assert_eq!(out.folder.scope, "routine");
  assert_eq!(out.folder.patient_id, "p1");
  assert_eq!(out.folder.document_ids(), vec![doc_id.as_str()]);
}

#[tokio::test]
async fn second_call_for_same_event_is_already_issued() {
  let store = seeded();
  let issuer = issuer(&store);
  let first = issuer.issue_certificate("e2").await.unwrap();
  let doc_id = issued_id(&first.status).to_owned();
  let creates = store.total(Op::Create);

  let second = issuer.issue_certificate("e2").await.unwrap();
  assert_eq!(second.status, IssuanceStatus::AlreadyIssued);
  assert_eq!(store.total(Op::Create), creates);
  assert_eq!(store.count(Op::Update, ResourceType::DocumentReference), 1);
  assert_eq!(second.folder.document_ids(), vec![doc_id.as_str()]);
}

#[tokio::test]
async fn imdpt1_history_aggregates_routine_doses_only() {
  let store = seeded();
  let catalog = VaccineCatalog::builtin();
  let classification = catalog.classify("IMDPT-1").unwrap();
  let doses = load_dose_history(&store, &catalog, "p1", &classification, Duration::from_secs(5))
    .await
    .unwrap();
  let names: Vec<&str> = doses.iter().map(|d| d.vaccine_name.as_str()).collect();
  assert_eq!(names, vec!["BCG", "DPT-HepB-Hib 1"]);
  assert_eq!(doses[1].dose_label(), "1");
}

#[tokio::test]
async fn non_routine_certificate_gets_its_own_folder() {
  let store = seeded();
  let issuer = issuer(&store);

  let covid = issuer.issue_certificate("e3").await.unwrap();
  assert_eq!(covid.folder.scope, "16927");
  let doc = stored(&store, ResourceType::DocumentReference, issued_id(&covid.status));
  assert_eq!(doc["type"]["coding"][0]["code"], "16927");

  let routine = issuer.issue_certificate("e1").await.unwrap();
  assert_eq!(routine.folder.scope, "routine");
  assert_ne!(routine.folder.id, covid.folder.id);
  assert_eq!(routine.folder.entries.len(), 1);
  assert_eq!(store.all(ResourceType::List).len(), 2);

  let catalog = VaccineCatalog::builtin();
  let classification = catalog.classify("16927").unwrap();
  let doses = load_dose_history(&store, &catalog, "p1", &classification, Duration::from_secs(5))
    .await
    .unwrap();
  assert_eq!(doses.len(), 1);
  assert_eq!(doses[0].immunization_id, "e3");
}

#[tokio::test]
async fn folder_lists_every_certificate_in_scope() {
  let store = seeded();
  let issuer = issuer(&store);
  let a = issuer.issue_certificate("e1").await.unwrap();
  let b = issuer.issue_certificate("e2").await.unwrap();

  let expected: BTreeSet<String> = [issued_id(&a.status), issued_id(&b.status)]
    .into_iter()
    .map(str::to_owned)
    .collect();
  let listed: BTreeSet<String> = b.folder.document_ids().into_iter().map(str::to_owned).collect();
  assert_eq!(listed, expected);
  assert_eq!(a.folder.id, b.folder.id);

  let found = issuer
    .folders()
    .find("p1", &VaccineScope::Routine)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.entries.len(), 2);
  assert_eq!(store.all(ResourceType::List).len(), 1);
  assert_eq!(store.count(Op::Create, ResourceType::List), 0);
}

#[tokio::test]
async fn overlapping_first_issuances_share_one_folder() {
  let store = seeded();
  for _ in 0..2 {
    store.fail_next(Op::Update, ResourceType::List, Fault::Delay(Duration::from_millis(50)));
  }
  let issuer = issuer(&store);

  let (a, b) = tokio::join!(issuer.issue_certificate("e1"), issuer.issue_certificate("e2"));
  let (a, b) = (a.unwrap(), b.unwrap());
  assert_eq!(a.folder.id, b.folder.id);
  assert_eq!(store.all(ResourceType::List).len(), 1);

  // Whichever write lost the race is healed by the next resync.
  let again = issuer.issue_certificate("e1").await.unwrap();
  assert_eq!(again.status, IssuanceStatus::AlreadyIssued);
  assert_eq!(again.folder.id, a.folder.id);
  assert_eq!(again.folder.entries.len(), 2);
  assert_eq!(store.all(ResourceType::List).len(), 1);
}

#[tokio::test]
async fn single_routine_dose_yields_one_row_and_one_entry() {
  let store = MemoryStore::new();
  store.seed(patient()).unwrap();
  store.seed(location()).unwrap();
  store.seed(immunization("e2", "IMDPT-1", "2023-02-26")).unwrap();

  let out = issuer(&store).issue_certificate("e2").await.unwrap();
  assert_eq!(out.folder.entries.len(), 1);
  assert_eq!(out.folder.document_ids(), vec![issued_id(&out.status)]);

  let layout = out.certificate.expect("a freshly issued certificate has a layout");
  assert_eq!(layout.title, "VACCINATION CERTIFICATE");
  assert_eq!(layout.rows.len(), 1);
  assert_eq!(layout.rows[0].vaccine, "DPT-HepB-Hib 1");
  assert_eq!(layout.rows[0].dose, "1");
  assert_eq!(layout.rows[0].date, "26-02-2023");
}

#[tokio::test]
async fn archive_dir_receives_the_pdf() {
  let dir = std::env::temp_dir().join(format!("ddcc-archive-{}", uuid::Uuid::new_v4()));
  let store = seeded();
  let config = IssuerConfig {
    archive_dir: Some(dir.clone()),
    ..Default::default()
  };
  let out = issuer_with(&store, config).issue_certificate("e2").await.unwrap();

  let path = dir.join(format!("{}.pdf", issued_id(&out.status)));
  let bytes = std::fs::read(&path).unwrap();
  assert!(bytes.starts_with(b"%PDF"));
  std::fs::remove_dir_all(&dir).unwrap();
}

// ─── Rejections before any write ─────────────────────────────────────────────

#[tokio::test]
async fn unknown_vaccine_code_performs_no_writes() {
  let store = seeded();
  store.seed(immunization("e9", "ZZZZ", "2024-01-01")).unwrap();

  let err = issuer(&store).issue_certificate("e9").await.unwrap_err();
  assert!(matches!(&err, IssuanceError::InvalidVaccineCode(code) if code == "ZZZZ"));
  assert_eq!(err.kind(), OutcomeKind::InvalidVaccineCode);
  assert_eq!(writes(&store), 0);
}

#[tokio::test]
async fn void_trigger_has_no_dose_history() {
  let store = MemoryStore::new();
  store.seed(patient()).unwrap();
  store.seed(location()).unwrap();
  let mut imm = immunization("e1", "16927", "2024-01-01");
  imm["status"] = json!("entered-in-error");
  store.seed(imm).unwrap();

  let err = issuer(&store).issue_certificate("e1").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::NoDoseHistory);
  assert_eq!(err.step(), Some(Step::Render));
  assert_eq!(writes(&store), 0);
}

#[tokio::test]
async fn missing_resources_map_to_not_found_kinds() {
  let store = seeded();
  let issuer = issuer(&store);

  let err = issuer.issue_certificate("nope").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::ImmunizationNotFound);

  let mut orphan = immunization("e7", "IMBCG-I", "2024-01-01");
  orphan["patient"] = json!({ "reference": "Patient/ghost" });
  store.seed(orphan).unwrap();
  let err = issuer.issue_certificate("e7").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::PatientNotFound);

  let mut elsewhere = immunization("e8", "IMBCG-I", "2024-01-01");
  elsewhere["location"] = json!({ "reference": "Location/ghost" });
  store.seed(elsewhere).unwrap();
  let err = issuer.issue_certificate("e8").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::FacilityNotFound);

  assert_eq!(writes(&store), 0);
}

#[tokio::test]
async fn immunization_without_location_is_malformed() {
  let store = seeded();
  let mut imm = immunization("e7", "IMBCG-I", "2024-01-01");
  imm.as_object_mut().unwrap().remove("location");
  store.seed(imm).unwrap();

  let err = issuer(&store).issue_certificate("e7").await.unwrap_err();
  assert!(matches!(
    &err,
    IssuanceError::MalformedImmunization { id, reason } if id == "e7" && reason.contains("location")
  ));
}

#[tokio::test]
async fn patient_without_name_is_malformed() {
  let store = seeded();
  let mut p = patient();
  p.as_object_mut().unwrap().remove("name");
  store.seed(p).unwrap();

  let err = issuer(&store).issue_certificate("e2").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::MalformedPatient);
  assert_eq!(writes(&store), 0);
}

// ─── Store failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn failure_mid_sequence_reports_step_and_created_resources() {
  let store = seeded();
  store.fail_next(Op::Create, ResourceType::Binary, Fault::transport("connection reset"));

  let err = issuer(&store).issue_certificate("e2").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::StoreTransportError);
  assert_eq!(err.step(), Some(Step::CreateBinary));

  let org = store.all(ResourceType::Organization)[0]["id"].as_str().unwrap().to_owned();
  let comp = store.all(ResourceType::Composition)[0]["id"].as_str().unwrap().to_owned();
  assert_eq!(
    err.created(),
    &[
      ResourceKey::new(ResourceType::Organization, org),
      ResourceKey::new(ResourceType::Composition, comp),
    ]
  );
  assert!(store.all(ResourceType::List).is_empty());
}

#[tokio::test]
async fn rejected_write_is_a_validation_error() {
  let store = seeded();
  store.fail_next(Op::Create, ResourceType::Bundle, Fault::rejected(422, "bad bundle"));

  let err = issuer(&store).issue_certificate("e2").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::StoreValidationError);
  assert_eq!(err.step(), Some(Step::CreateBundle));
  assert_eq!(err.created().len(), 3);
  assert!(!err.kind().is_retryable());
}

#[tokio::test]
async fn rollback_deletes_created_resources_in_reverse() {
  let store = seeded();
  store.fail_next(
    Op::Update,
    ResourceType::DocumentReference,
    Fault::rejected(422, "bad reference"),
  );
  let config = IssuerConfig {
    rollback_on_failure: true,
    ..Default::default()
  };

  let err = issuer_with(&store, config).issue_certificate("e2").await.unwrap_err();
  assert_eq!(err.step(), Some(Step::PutDocumentReference));
  assert!(err.created().is_empty());

  let IssuanceError::StoreFailed {
    compensation: Some(report),
    ..
  } = &err
  else {
    panic!("expected a compensation report, got {err:?}");
  };
  let order: Vec<ResourceType> = report.deleted.iter().map(|k| k.resource_type).collect();
  assert_eq!(
    order,
    vec![
      ResourceType::DocumentReference,
      ResourceType::Bundle,
      ResourceType::Binary,
      ResourceType::Composition,
      ResourceType::Organization,
    ]
  );
  assert!(report.failed.is_empty());
  for rt in [
    ResourceType::Organization,
    ResourceType::Composition,
    ResourceType::Binary,
    ResourceType::Bundle,
  ] {
    assert!(store.all(rt).is_empty(), "{rt} left behind");
  }
}

#[tokio::test]
async fn rollback_removes_a_document_reference_whose_response_was_lost() {
  let store = seeded();
  store.fail_next(
    Op::Update,
    ResourceType::DocumentReference,
    Fault::Lost(StoreError::Timeout),
  );
  let config = IssuerConfig {
    rollback_on_failure: true,
    ..Default::default()
  };

  let err = issuer_with(&store, config).issue_certificate("e2").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::StoreTimeout);
  assert_eq!(err.step(), Some(Step::PutDocumentReference));
  assert!(err.created().is_empty());
  assert_eq!(store.count(Op::Delete, ResourceType::DocumentReference), 1);
  assert!(store.all(ResourceType::DocumentReference).is_empty());
  assert!(store.all(ResourceType::List).is_empty());
}

#[tokio::test]
async fn slow_store_call_times_out() {
  let store = seeded();
  store.fail_next(
    Op::Read,
    ResourceType::Patient,
    Fault::Delay(Duration::from_millis(1500)),
  );
  let config = IssuerConfig {
    store_timeout_secs: 1,
    ..Default::default()
  };

  let err = issuer_with(&store, config).issue_certificate("e2").await.unwrap_err();
  assert_eq!(err.kind(), OutcomeKind::StoreTimeout);
  assert_eq!(err.step(), Some(Step::ReadPatient));
  assert!(err.kind().is_retryable());
}

#[tokio::test]
async fn resync_failure_after_writes_lists_all_five() {
  let store = seeded();
  store.fail_next(
    Op::Search,
    ResourceType::DocumentReference,
    Fault::transport("gateway hiccup"),
  );

  let err = issuer(&store).issue_certificate("e2").await.unwrap_err();
  assert_eq!(err.step(), Some(Step::ResyncFolder));
  assert_eq!(err.created().len(), 5);
  assert_eq!(err.created()[4].resource_type, ResourceType::DocumentReference);

  // The next call for the event takes the dedup path and heals the folder.
  let retry = issuer(&store).issue_certificate("e2").await.unwrap();
  assert_eq!(retry.status, IssuanceStatus::AlreadyIssued);
  assert_eq!(retry.folder.entries.len(), 1);
}

// ─── Subscription ────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscription_upsert_is_skipped_without_target() {
  let store = MemoryStore::new();
  let written = upsert_subscription(&store, &SubscriptionConfig::default(), Duration::from_secs(1))
    .await
    .unwrap();
  assert!(written.is_none());
  assert_eq!(store.total(Op::Update), 0);
}

#[tokio::test]
async fn subscription_upsert_writes_rest_hook() {
  let store = MemoryStore::new();
  let config = SubscriptionConfig {
    id:           Some("ddcc-mediator".into()),
    callback_url: Some("http://mediator:8080/subscriptions".into()),
    criteria:     "Immunization?".into(),
    header:       Some("Authorization: Bearer abc".into()),
  };
  upsert_subscription(&store, &config, Duration::from_secs(1)).await.unwrap();
  upsert_subscription(&store, &config, Duration::from_secs(1)).await.unwrap();

  let subs = store.all(ResourceType::Subscription);
  assert_eq!(subs.len(), 1);
  assert_eq!(subs[0]["id"], "ddcc-mediator");
  assert_eq!(subs[0]["channel"]["type"], "rest-hook");
  assert_eq!(subs[0]["channel"]["payload"], "application/fhir+json");
  assert_eq!(subs[0]["channel"]["header"][0], "Authorization: Bearer abc");
  assert_eq!(subs[0]["meta"]["versionId"], "2");
}
