//! `FhirStore` against a throwaway axum server standing in for a FHIR server.

use std::time::Duration;

use axum::{
  Json, Router,
  extract::{Path, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
  routing::get,
};
use ddcc_core::{ResourceStore, ResourceType, SearchQuery, StoreError};
use serde_json::{Value, json};

use crate::{FhirConfig, FhirStore};

// ─── Mock server ─────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Mock {
  base: String,
}

fn outcome(code: &str, text: &str) -> Value {
  json!({
    "resourceType": "OperationOutcome",
    "issue": [{ "severity": "error", "code": code, "diagnostics": text }]
  })
}

async fn read_patient(Path(id): Path<String>) -> Response {
  match id.as_str() {
    "p1" => Json(json!({ "resourceType": "Patient", "id": "p1" })).into_response(),
    "gone" => StatusCode::GONE.into_response(),
    "outcome" => Json(outcome("exception", "backend hiccup")).into_response(),
    _ => (StatusCode::NOT_FOUND, Json(outcome("not-found", "unknown"))).into_response(),
  }
}

async fn read_location() -> Response {
  (StatusCode::INTERNAL_SERVER_ERROR, "database down").into_response()
}

async fn read_organization() -> Response {
  tokio::time::sleep(Duration::from_secs(2)).await;
  Json(json!({ "resourceType": "Organization", "id": "o1" })).into_response()
}

async fn read_composition(headers: HeaderMap) -> Response {
  let auth = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .to_owned();
  Json(json!({ "resourceType": "Composition", "id": "c1", "title": auth })).into_response()
}

async fn create_binary(Json(mut body): Json<Value>) -> Response {
  body["id"] = json!("b-1");
  (StatusCode::CREATED, Json(body)).into_response()
}

async fn create_bundle(State(mock): State<Mock>) -> Response {
  (
    StatusCode::CREATED,
    [(header::LOCATION, format!("{}/Bundle/bun-9/_history/1", mock.base))],
  )
    .into_response()
}

async fn put_document_reference(Path(id): Path<String>, Json(mut body): Json<Value>) -> Response {
  body["meta"] = json!({ "versionId": "1" });
  body["id"] = json!(id);
  (StatusCode::CREATED, Json(body)).into_response()
}

async fn put_list() -> Response {
  (
    StatusCode::UNPROCESSABLE_ENTITY,
    Json(outcome("invalid", "List.status is required")),
  )
    .into_response()
}

async fn delete_binary() -> Response {
  Json(json!({
    "resourceType": "OperationOutcome",
    "issue": [{ "severity": "information", "code": "informational" }]
  }))
  .into_response()
}

async fn search_immunizations(State(mock): State<Mock>) -> Response {
  Json(json!({
    "resourceType": "Bundle",
    "type": "searchset",
    "total": 3,
    "link": [{ "relation": "next", "url": format!("{}/page-2", mock.base) }],
    "entry": [
      { "resource": { "resourceType": "Immunization", "id": "e1" } },
      { "resource": { "resourceType": "Immunization", "id": "e2" } }
    ]
  }))
  .into_response()
}

async fn page_two() -> Response {
  Json(json!({
    "resourceType": "Bundle",
    "type": "searchset",
    "entry": [
      { "resource": { "resourceType": "Immunization", "id": "e3" } },
      { "resource": outcome("informational", "truncated") }
    ]
  }))
  .into_response()
}

async fn serve() -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let base = format!("http://{}/fhir", listener.local_addr().unwrap());

  let router = Router::new()
    .route("/fhir/Patient/{id}", get(read_patient))
    .route("/fhir/Location/{id}", get(read_location))
    .route("/fhir/Organization/{id}", get(read_organization))
    .route("/fhir/Composition/{id}", get(read_composition))
    .route("/fhir/Binary", axum::routing::post(create_binary))
    .route("/fhir/Binary/{id}", axum::routing::delete(delete_binary))
    .route("/fhir/Bundle", axum::routing::post(create_bundle))
    .route("/fhir/DocumentReference/{id}", axum::routing::put(put_document_reference))
    .route("/fhir/List/{id}", axum::routing::put(put_list))
    .route("/fhir/Immunization", get(search_immunizations))
    .route("/fhir/page-2", get(page_two))
    .with_state(Mock { base: base.clone() });

  tokio::spawn(async move {
    axum::serve(listener, router).await.unwrap();
  });
  base
}

async fn store() -> FhirStore {
  FhirStore::new(&FhirConfig::new(serve().await)).unwrap()
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn read_returns_resource_body() {
  let s = store().await;
  let body = s.read(ResourceType::Patient, "p1").await.unwrap().unwrap();
  assert_eq!(body["id"], "p1");
}

#[tokio::test]
async fn read_maps_404_and_410_to_none() {
  let s = store().await;
  assert!(s.read(ResourceType::Patient, "missing").await.unwrap().is_none());
  assert!(s.read(ResourceType::Patient, "gone").await.unwrap().is_none());
}

#[tokio::test]
async fn read_treats_outcome_body_as_rejection() {
  let s = store().await;
  let err = s.read(ResourceType::Patient, "outcome").await.unwrap_err();
  match err {
    StoreError::Rejected { status, outcome } => {
      assert_eq!(status, 200);
      assert_eq!(outcome.issue[0].code, "exception");
    }
    other => panic!("unexpected {other:?}"),
  }
}

#[tokio::test]
async fn server_error_is_transport() {
  let s = store().await;
  let err = s.read(ResourceType::Location, "l1").await.unwrap_err();
  assert!(matches!(err, StoreError::Transport(m) if m.contains("500")));
}

#[tokio::test]
async fn slow_server_is_timeout() {
  let config = FhirConfig::new(serve().await);
  let s = FhirStore::with_timeout(&config, Duration::from_millis(200)).unwrap();
  let err = s.read(ResourceType::Organization, "o1").await.unwrap_err();
  assert!(matches!(err, StoreError::Timeout));
}

#[tokio::test]
async fn bearer_token_is_sent() {
  let mut config = FhirConfig::new(serve().await);
  config.bearer_token = Some("s3cret".into());
  let s = FhirStore::new(&config).unwrap();
  let body = s.read(ResourceType::Composition, "c1").await.unwrap().unwrap();
  assert_eq!(body["title"], "Bearer s3cret");
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_returns_server_assigned_id() {
  let s = store().await;
  let created = s
    .create(ResourceType::Binary, json!({ "resourceType": "Binary", "contentType": "application/pdf" }))
    .await
    .unwrap();
  assert_eq!(created.id, "b-1");
  assert_eq!(created.body["contentType"], "application/pdf");
}

#[tokio::test]
async fn create_with_empty_body_reads_location_header() {
  let s = store().await;
  let created = s
    .create(ResourceType::Bundle, json!({ "resourceType": "Bundle", "type": "document" }))
    .await
    .unwrap();
  assert_eq!(created.id, "bun-9");
  assert_eq!(created.body["id"], "bun-9");
  assert_eq!(created.body["type"], "document");
}

#[tokio::test]
async fn update_puts_under_the_given_id() {
  let s = store().await;
  let body = s
    .update(
      ResourceType::DocumentReference,
      "doc-1",
      json!({ "resourceType": "DocumentReference" }),
    )
    .await
    .unwrap();
  assert_eq!(body["id"], "doc-1");
  assert_eq!(body["meta"]["versionId"], "1");
}

#[tokio::test]
async fn update_rejection_carries_outcome() {
  let s = store().await;
  let err = s
    .update(ResourceType::List, "f1", json!({ "resourceType": "List" }))
    .await
    .unwrap_err();
  match err {
    StoreError::Rejected { status, outcome } => {
      assert_eq!(status, 422);
      assert!(outcome.summary().contains("List.status is required"));
    }
    other => panic!("unexpected {other:?}"),
  }
}

#[tokio::test]
async fn delete_ignores_informational_outcome() {
  let s = store().await;
  s.delete(ResourceType::Binary, "b-1").await.unwrap();
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_follows_next_links_and_skips_foreign_entries() {
  let s = store().await;
  let q = SearchQuery::new()
    .param("patient", "Patient/p1")
    .param("_sort", "date");
  let set = s.search(ResourceType::Immunization, &q).await.unwrap();
  let ids: Vec<&str> = set.entries.iter().map(|b| b["id"].as_str().unwrap()).collect();
  assert_eq!(ids, vec!["e1", "e2", "e3"]);
  assert_eq!(set.total, Some(3));
}
