//! [`FhirStore`]: the reqwest implementation of [`ResourceStore`].

use std::time::Duration;

use ddcc_core::{
  Created, ResourceStore, ResourceType, SearchQuery, SearchSet, StoreError,
  StoreResult,
};
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde_json::Value;

use crate::{
  FhirConfig,
  response::{decode_body, map_status_error, map_transport_error},
};

const FHIR_JSON: &str = "application/fhir+json";
const MAX_PAGES: usize = 1000;

/// A resource store backed by a FHIR R4 REST server.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct FhirStore {
  client:       Client,
  base_url:     String,
  bearer_token: Option<String>,
}

impl FhirStore {
  pub fn new(config: &FhirConfig) -> Result<Self, reqwest::Error> {
    Self::with_timeout(config, config.timeout())
  }

  pub fn with_timeout(config: &FhirConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      bearer_token: config.bearer_token.clone(),
    })
  }

  fn type_url(&self, resource_type: ResourceType) -> String {
    format!("{}/{}", self.base_url, resource_type)
  }

  fn instance_url(&self, resource_type: ResourceType, id: &str) -> String {
    format!("{}/{}/{}", self.base_url, resource_type, id)
  }

  fn prepare(&self, req: RequestBuilder) -> RequestBuilder {
    let req = req.header(header::ACCEPT, FHIR_JSON);
    match &self.bearer_token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  /// Send and collect status, headers and body.
  async fn exchange(
    &self,
    req: RequestBuilder,
  ) -> StoreResult<(StatusCode, header::HeaderMap, Vec<u8>)> {
    let response = self.prepare(req).send().await.map_err(map_transport_error)?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(map_transport_error)?;
    Ok((status, headers, body.to_vec()))
  }

  fn json_body(req: RequestBuilder, body: &Value) -> StoreResult<RequestBuilder> {
    let bytes = serde_json::to_vec(body)
      .map_err(|e| StoreError::Transport(format!("cannot encode request body: {e}")))?;
    Ok(req.header(header::CONTENT_TYPE, FHIR_JSON).body(bytes))
  }

  /// Fetch one search page and append its matches.
  async fn search_page(
    &self,
    req: RequestBuilder,
    resource_type: ResourceType,
    set: &mut SearchSet,
  ) -> StoreResult<Option<String>> {
    let (status, _, body) = self.exchange(req).await?;
    if !status.is_success() {
      return Err(map_status_error(status, &body));
    }
    let bundle = decode_body(status, &body)?;
    if set.total.is_none() {
      set.total = bundle.get("total").and_then(Value::as_u64);
    }
    let entries = bundle
      .get("entry")
      .and_then(Value::as_array)
      .into_iter()
      .flatten()
      .filter_map(|e| e.get("resource"))
      .filter(|r| r.get("resourceType").and_then(Value::as_str) == Some(resource_type.as_str()));
    set.entries.extend(entries.cloned());
    Ok(next_link(&bundle))
  }
}

/// The `next` paging link of a searchset bundle.
fn next_link(bundle: &Value) -> Option<String> {
  bundle
    .get("link")?
    .as_array()?
    .iter()
    .find(|l| l.get("relation").and_then(Value::as_str) == Some("next"))
    .and_then(|l| l.get("url"))
    .and_then(Value::as_str)
    .map(str::to_owned)
}

/// The logical id out of a `Location` header such as
/// `{base}/Binary/123/_history/1`.
fn id_from_location(location: &str, resource_type: ResourceType) -> Option<String> {
  let mut segments = location.split('/');
  segments.find(|s| *s == resource_type.as_str())?;
  segments.next().filter(|s| !s.is_empty()).map(str::to_owned)
}

// ─── ResourceStore impl ──────────────────────────────────────────────────────

impl ResourceStore for FhirStore {
  async fn create<'a>(
    &'a self,
    resource_type: ResourceType,
    body: Value,
  ) -> StoreResult<Created> {
    let req = self
      .client
      .post(self.type_url(resource_type))
      .header("Prefer", "return=representation");
    let (status, headers, bytes) = self.exchange(Self::json_body(req, &body)?).await?;
    if !status.is_success() {
      return Err(map_status_error(status, &bytes));
    }

    // Servers honouring `return=minimal` answer with an empty body and a
    // Location header.
    let (id, body) = if bytes.iter().all(u8::is_ascii_whitespace) {
      let id = headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|l| id_from_location(l, resource_type))
        .ok_or_else(|| StoreError::Transport("create response carried no id".into()))?;
      let mut body = body;
      if let Some(obj) = body.as_object_mut() {
        obj.insert("id".into(), Value::String(id.clone()));
      }
      (id, body)
    } else {
      let created = decode_body(status, &bytes)?;
      let id = created
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| StoreError::Transport("created resource has no id".into()))?;
      (id, created)
    };

    tracing::debug!(%resource_type, %id, "created");
    Ok(Created { id, body })
  }

  async fn read<'a>(
    &'a self,
    resource_type: ResourceType,
    id: &'a str,
  ) -> StoreResult<Option<Value>> {
    let req = self
      .client
      .get(self.instance_url(resource_type, id))
      .header(header::CACHE_CONTROL, "no-cache");
    let (status, _, bytes) = self.exchange(req).await?;
    match status {
      StatusCode::NOT_FOUND | StatusCode::GONE => {
        tracing::debug!(%resource_type, %id, %status, "not found");
        Ok(None)
      }
      s if s.is_success() => decode_body(s, &bytes).map(Some),
      s => Err(map_status_error(s, &bytes)),
    }
  }

  async fn update<'a>(
    &'a self,
    resource_type: ResourceType,
    id: &'a str,
    mut body: Value,
  ) -> StoreResult<Value> {
    if let Some(obj) = body.as_object_mut() {
      obj.insert("id".into(), Value::String(id.to_owned()));
    }
    let req = self
      .client
      .put(self.instance_url(resource_type, id))
      .header("Prefer", "return=representation");
    let (status, _, bytes) = self.exchange(Self::json_body(req, &body)?).await?;
    if !status.is_success() {
      return Err(map_status_error(status, &bytes));
    }
    tracing::debug!(%resource_type, %id, %status, "updated");
    if bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(body);
    }
    decode_body(status, &bytes)
  }

  async fn search<'a>(
    &'a self,
    resource_type: ResourceType,
    query: &'a SearchQuery,
  ) -> StoreResult<SearchSet> {
    let mut set = SearchSet::default();
    let first = self
      .client
      .get(self.type_url(resource_type))
      .header(header::CACHE_CONTROL, "no-cache")
      .query(query.params());
    let mut next = self.search_page(first, resource_type, &mut set).await?;

    let mut pages = 1;
    while let Some(url) = next {
      if pages >= MAX_PAGES {
        return Err(StoreError::Transport(format!(
          "search paging exceeded {MAX_PAGES} pages"
        )));
      }
      let req = self
        .client
        .get(url)
        .header(header::CACHE_CONTROL, "no-cache");
      next = self.search_page(req, resource_type, &mut set).await?;
      pages += 1;
    }

    tracing::debug!(
      %resource_type,
      pages,
      matches = set.entries.len(),
      "search complete"
    );
    Ok(set)
  }

  async fn delete<'a>(&'a self, resource_type: ResourceType, id: &'a str) -> StoreResult<()> {
    let req = self.client.delete(self.instance_url(resource_type, id));
    let (status, _, bytes) = self.exchange(req).await?;
    // A delete answers with an informational OperationOutcome, so the body is
    // not inspected.
    if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
      tracing::debug!(%resource_type, %id, %status, "deleted");
      return Ok(());
    }
    Err(map_status_error(status, &bytes))
  }
}
