//! [`MemoryStore`]: the in-process implementation of [`ResourceStore`].

use std::{
  collections::{BTreeMap, HashMap},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{SecondsFormat, Utc};
use ddcc_core::{
  Created, ResourceStore, ResourceType, SearchQuery, SearchSet, StoreError,
  StoreResult,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
  fault::{Armed, Fault, Op},
  search::{Plan, sort_by_date},
};

// ─── Tables ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Table {
  order: Vec<String>,
  rows:  HashMap<String, Value>,
}

impl Table {
  fn put(&mut self, id: &str, body: Value) {
    if self.rows.insert(id.to_owned(), body).is_none() {
      self.order.push(id.to_owned());
    }
  }

  fn remove(&mut self, id: &str) -> bool {
    let existed = self.rows.remove(id).is_some();
    if existed {
      self.order.retain(|o| o != id);
    }
    existed
  }

  fn ordered(&self) -> impl Iterator<Item = &Value> {
    self.order.iter().filter_map(|id| self.rows.get(id))
  }
}

#[derive(Debug, Default)]
struct Inner {
  tables: BTreeMap<ResourceType, Table>,
  /// Calls per (operation, type) that reached the tables.
  log:    HashMap<(Op, ResourceType), usize>,
  faults: Vec<Armed>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An in-memory resource store.
///
/// Cloning is cheap; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Store `body` under its own `id` without touching the operation log.
  /// Bodies without an id get a fresh one. Returns the id.
  pub fn seed(&self, body: Value) -> StoreResult<String> {
    let resource_type = resource_type_of(&body)?;
    let id = body
      .get("id")
      .and_then(Value::as_str)
      .map(str::to_owned)
      .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut inner = self.lock();
    let table = inner.tables.entry(resource_type).or_default();
    let version = next_version(table.rows.get(&id));
    table.put(&id, stamp(body, &id, version));
    Ok(id)
  }

  /// Every stored resource of a type, in insertion order.
  pub fn all(&self, resource_type: ResourceType) -> Vec<Value> {
    self
      .lock()
      .tables
      .get(&resource_type)
      .map(|t| t.ordered().cloned().collect())
      .unwrap_or_default()
  }

  /// Number of `op` calls on `resource_type` that reached the tables.
  pub fn count(&self, op: Op, resource_type: ResourceType) -> usize {
    self
      .lock()
      .log
      .get(&(op, resource_type))
      .copied()
      .unwrap_or(0)
  }

  /// Number of `op` calls across all types that reached the tables.
  pub fn total(&self, op: Op) -> usize {
    self
      .lock()
      .log
      .iter()
      .filter(|((o, _), _)| *o == op)
      .map(|(_, n)| n)
      .sum()
  }

  /// Arm a fault on the `nth` (1-based) upcoming `op` call against
  /// `resource_type`.
  pub fn fail_nth(&self, op: Op, resource_type: ResourceType, nth: usize, fault: Fault) {
    self.lock().faults.push(Armed {
      op,
      resource_type,
      skip: nth.saturating_sub(1),
      fault,
    });
  }

  /// Arm a fault on the next `op` call against `resource_type`.
  pub fn fail_next(&self, op: Op, resource_type: ResourceType, fault: Fault) {
    self.fail_nth(op, resource_type, 1, fault);
  }

  fn take_fault(&self, op: Op, resource_type: ResourceType) -> Option<Fault> {
    let mut inner = self.lock();
    let mut fired = None;
    for (i, armed) in inner.faults.iter_mut().enumerate() {
      if !armed.matches(op, resource_type) {
        continue;
      }
      if armed.skip == 0 {
        fired = Some(i);
        break;
      }
      armed.skip -= 1;
    }
    fired.map(|i| inner.faults.remove(i).fault)
  }

  /// Fire any fault armed for this call. `Ok(Some(err))` means the call
  /// must run and then report `err`.
  async fn trip(&self, op: Op, resource_type: ResourceType) -> StoreResult<Option<StoreError>> {
    match self.take_fault(op, resource_type) {
      Some(Fault::Fail(err)) => {
        tracing::debug!(?op, %resource_type, error = %err, "injected store fault");
        Err(err)
      }
      Some(Fault::Delay(duration)) => {
        tokio::time::sleep(duration).await;
        Ok(None)
      }
      Some(Fault::Lost(err)) => Ok(Some(err)),
      None => Ok(None),
    }
  }

  fn record(inner: &mut Inner, op: Op, resource_type: ResourceType) {
    *inner.log.entry((op, resource_type)).or_default() += 1;
  }
}

// ─── Body helpers ────────────────────────────────────────────────────────────

fn resource_type_of(body: &Value) -> StoreResult<ResourceType> {
  body
    .get("resourceType")
    .and_then(Value::as_str)
    .ok_or_else(|| StoreError::rejected(400, "invalid", "body has no resourceType"))?
    .parse()
    .map_err(|e: String| StoreError::rejected(400, "not-supported", e))
}

fn check_type(expected: ResourceType, body: &Value) -> StoreResult<()> {
  let found = resource_type_of(body)?;
  if found != expected {
    return Err(StoreError::rejected(
      400,
      "invalid",
      format!("resourceType {found} does not match endpoint {expected}"),
    ));
  }
  Ok(())
}

/// Report a lost response after the call already took effect.
fn settle<T>(lost: Option<StoreError>, value: T) -> StoreResult<T> {
  match lost {
    Some(err) => Err(err),
    None => Ok(value),
  }
}

fn next_version(existing: Option<&Value>) -> u64 {
  existing
    .and_then(|b| b.pointer("/meta/versionId"))
    .and_then(Value::as_str)
    .and_then(|v| v.parse::<u64>().ok())
    .map_or(1, |v| v + 1)
}

/// Set `id`, `meta.versionId` and `meta.lastUpdated`.
fn stamp(mut body: Value, id: &str, version: u64) -> Value {
  if let Some(obj) = body.as_object_mut() {
    obj.insert("id".into(), json!(id));
    let meta = obj.entry("meta").or_insert_with(|| json!({}));
    if let Some(meta) = meta.as_object_mut() {
      meta.insert("versionId".into(), json!(version.to_string()));
      meta.insert(
        "lastUpdated".into(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
      );
    }
  }
  body
}

// ─── ResourceStore impl ──────────────────────────────────────────────────────

impl ResourceStore for MemoryStore {
  async fn create<'a>(
    &'a self,
    resource_type: ResourceType,
    body: Value,
  ) -> StoreResult<Created> {
    let lost = self.trip(Op::Create, resource_type).await?;
    check_type(resource_type, &body)?;

    let id = Uuid::new_v4().to_string();
    let body = stamp(body, &id, 1);

    let mut inner = self.lock();
    inner
      .tables
      .entry(resource_type)
      .or_default()
      .put(&id, body.clone());
    Self::record(&mut inner, Op::Create, resource_type);
    tracing::debug!(%resource_type, %id, "created");
    settle(lost, Created { id, body })
  }

  async fn read<'a>(
    &'a self,
    resource_type: ResourceType,
    id: &'a str,
  ) -> StoreResult<Option<Value>> {
    let lost = self.trip(Op::Read, resource_type).await?;
    let mut inner = self.lock();
    let found = inner
      .tables
      .get(&resource_type)
      .and_then(|t| t.rows.get(id))
      .cloned();
    Self::record(&mut inner, Op::Read, resource_type);
    settle(lost, found)
  }

  async fn update<'a>(
    &'a self,
    resource_type: ResourceType,
    id: &'a str,
    body: Value,
  ) -> StoreResult<Value> {
    let lost = self.trip(Op::Update, resource_type).await?;
    check_type(resource_type, &body)?;
    if let Some(body_id) = body.get("id").and_then(Value::as_str)
      && body_id != id
    {
      return Err(StoreError::rejected(
        400,
        "invalid",
        format!("body id {body_id} does not match {id}"),
      ));
    }

    let mut inner = self.lock();
    let table = inner.tables.entry(resource_type).or_default();
    let version = next_version(table.rows.get(id));
    let body = stamp(body, id, version);
    table.put(id, body.clone());
    Self::record(&mut inner, Op::Update, resource_type);
    tracing::debug!(%resource_type, %id, version, "updated");
    settle(lost, body)
  }

  async fn search<'a>(
    &'a self,
    resource_type: ResourceType,
    query: &'a SearchQuery,
  ) -> StoreResult<SearchSet> {
    let lost = self.trip(Op::Search, resource_type).await?;
    let plan = Plan::compile(query)?;

    let mut inner = self.lock();
    let mut entries: Vec<Value> = inner
      .tables
      .get(&resource_type)
      .map(|t| t.ordered().filter(|b| plan.matches(b)).cloned().collect())
      .unwrap_or_default();
    if let Some(order) = plan.sort {
      sort_by_date(resource_type, &mut entries, order);
    }
    Self::record(&mut inner, Op::Search, resource_type);

    settle(lost, SearchSet {
      total: Some(entries.len() as u64),
      entries,
    })
  }

  async fn delete<'a>(&'a self, resource_type: ResourceType, id: &'a str) -> StoreResult<()> {
    let lost = self.trip(Op::Delete, resource_type).await?;
    let mut inner = self.lock();
    let existed = inner
      .tables
      .get_mut(&resource_type)
      .is_some_and(|t| t.remove(id));
    Self::record(&mut inner, Op::Delete, resource_type);
    tracing::debug!(%resource_type, %id, existed, "deleted");
    settle(lost, ())
  }
}
