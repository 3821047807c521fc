//! Folder Index Manager: one `List` per (patient, scope) naming every issued
//! certificate's DocumentReference.
//!
//! Resync is a full overwrite computed from a fresh search, always written
//! with a PUT. Two concurrent resyncs race and the last writer wins; the
//! next resync heals any entry the loser dropped.

use std::{sync::Arc, time::Duration};

use ddcc_core::{
  Resource, ResourceStore, ResourceType, SearchQuery, StoreError, VaccineScope,
  resource::{DocumentReference, FolderIndex},
};
use serde_json::Value;
use thiserror::Error;

use crate::{
  IssuerConfig,
  deadline::within,
  resources::{folder_entries, folder_id, folder_list},
};

/// The folder could not be synchronised.
#[derive(Debug, Error)]
pub enum FolderError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("store returned an unreadable folder: {0}")]
  Decode(#[from] ddcc_core::Error),
}

impl FolderError {
  /// Collapse into a store error for issuance reporting.
  pub fn into_store_error(self) -> StoreError {
    match self {
      Self::Store(e) => e,
      Self::Decode(e) => StoreError::Transport(e.to_string()),
    }
  }
}

pub struct FolderIndexManager<S> {
  store:  Arc<S>,
  config: Arc<IssuerConfig>,
}

impl<S> Clone for FolderIndexManager<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      config: Arc::clone(&self.config),
    }
  }
}

impl<S: ResourceStore> FolderIndexManager<S> {
  pub fn new(store: Arc<S>, config: Arc<IssuerConfig>) -> Self { Self { store, config } }

  fn limit(&self) -> Duration { self.config.store_timeout() }

  /// The raw List body for (patient, scope), if one exists.
  async fn find_raw(&self, patient_id: &str, scope: &VaccineScope) -> Result<Option<Value>, FolderError> {
    let query = SearchQuery::new()
      .param("subject", format!("Patient/{patient_id}"))
      .param("code", scope.key());
    let set = within(self.limit(), self.store.search(ResourceType::List, &query)).await?;
    if set.entries.len() > 1 {
      tracing::warn!(
        %patient_id,
        scope = %scope,
        count = set.entries.len(),
        "several folders for one scope; using the first"
      );
    }
    Ok(set.entries.into_iter().next())
  }

  pub async fn find(&self, patient_id: &str, scope: &VaccineScope) -> Result<Option<FolderIndex>, FolderError> {
    match self.find_raw(patient_id, scope).await? {
      Some(body) => Ok(Some(FolderIndex::decode(body)?)),
      None => Ok(None),
    }
  }

  /// Ids of every DocumentReference in scope, ordered by `date` then id.
  async fn issued_documents(&self, patient_id: &str, scope: &VaccineScope) -> Result<Vec<String>, FolderError> {
    let query = SearchQuery::new()
      .param("subject", format!("Patient/{patient_id}"))
      .param("type", scope.key());
    let set = within(
      self.limit(),
      self.store.search(ResourceType::DocumentReference, &query),
    )
    .await?;

    let mut docs: Vec<DocumentReference> = set
      .entries
      .into_iter()
      .map(DocumentReference::decode)
      .collect::<Result<_, _>>()?;
    docs.sort_by(|a, b| {
      (a.date.is_none(), a.date, &a.id).cmp(&(b.date.is_none(), b.date, &b.id))
    });
    Ok(docs.into_iter().map(|d| d.id).collect())
  }

  /// Rewrite the folder so it lists every certificate issued in scope.
  ///
  /// A new folder is PUT under a deterministic id, so overlapping first
  /// issuances for one scope converge on a single List.
  pub async fn resync(&self, patient_id: &str, scope: &VaccineScope) -> Result<FolderIndex, FolderError> {
    let entries = self.issued_documents(patient_id, scope).await?;

    let (id, body) = match self.find_raw(patient_id, scope).await? {
      Some(mut body) => {
        let id = body
          .get("id")
          .and_then(Value::as_str)
          .map(str::to_owned)
          .ok_or(ddcc_core::Error::MissingField {
            resource_type: ResourceType::List,
            field:         "id",
          })?;
        if let Some(obj) = body.as_object_mut() {
          obj.insert("entry".into(), folder_entries(&entries));
        }
        (id, body)
      }
      None => (
        folder_id(patient_id, scope),
        folder_list(&self.config, patient_id, scope, &entries),
      ),
    };
    let written = within(self.limit(), self.store.update(ResourceType::List, &id, body)).await?;

    let folder = FolderIndex::decode(written)?;
    tracing::info!(
      %patient_id,
      scope = %scope,
      folder_id = %folder.id,
      entries = folder.entries.len(),
      "folder resynced"
    );
    Ok(folder)
  }
}
