//! The certificate write sequence as an explicit state machine.
//!
//! Writes happen in a fixed order and are not atomic. [`WriteProgress`]
//! records every resource created so far, so a failure can report exactly
//! what was left in the store, and the compensator knows what to delete.

use ddcc_core::{ResourceType, StoreError};

use crate::error::{Compensation, IssuanceError, ResourceKey, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
  Organization,
  Composition,
  Binary,
  Bundle,
  DocumentReference,
  Done,
}

impl WriteStage {
  pub fn resource_type(&self) -> Option<ResourceType> {
    Some(match self {
      Self::Organization => ResourceType::Organization,
      Self::Composition => ResourceType::Composition,
      Self::Binary => ResourceType::Binary,
      Self::Bundle => ResourceType::Bundle,
      Self::DocumentReference => ResourceType::DocumentReference,
      Self::Done => return None,
    })
  }

  pub fn step(&self) -> Option<Step> {
    Some(match self {
      Self::Organization => Step::CreateOrganization,
      Self::Composition => Step::CreateComposition,
      Self::Binary => Step::CreateBinary,
      Self::Bundle => Step::CreateBundle,
      Self::DocumentReference => Step::PutDocumentReference,
      Self::Done => return None,
    })
  }

  fn next(self) -> Self {
    match self {
      Self::Organization => Self::Composition,
      Self::Composition => Self::Binary,
      Self::Binary => Self::Bundle,
      Self::Bundle => Self::DocumentReference,
      Self::DocumentReference | Self::Done => Self::Done,
    }
  }
}

#[derive(Debug, Clone)]
pub struct WriteProgress {
  stage:   WriteStage,
  created: Vec<ResourceKey>,
}

impl Default for WriteProgress {
  fn default() -> Self { Self::new() }
}

impl WriteProgress {
  pub fn new() -> Self {
    Self {
      stage:   WriteStage::Organization,
      created: Vec::new(),
    }
  }

  pub fn stage(&self) -> WriteStage { self.stage }

  pub fn is_complete(&self) -> bool { self.stage == WriteStage::Done }

  pub fn created(&self) -> &[ResourceKey] { &self.created }

  /// Record the id the store assigned to the current stage's resource and
  /// move to the next stage.
  pub fn record(&mut self, id: &str) {
    let Some(resource_type) = self.stage.resource_type() else {
      debug_assert!(false, "record called after the write sequence completed");
      return;
    };
    self.created.push(ResourceKey::new(resource_type, id));
    self.stage = self.stage.next();
  }

  /// The id recorded for `resource_type`, if that stage has completed.
  pub fn id_of(&self, resource_type: ResourceType) -> Option<&str> {
    self
      .created
      .iter()
      .find(|k| k.resource_type == resource_type)
      .map(|k| k.id.as_str())
  }

  /// Turn a store failure at the current stage into an issuance error.
  /// When `compensation` is present, only resources it failed to delete are
  /// reported as left behind.
  pub fn fail(self, source: StoreError, compensation: Option<Compensation>) -> IssuanceError {
    let step = self.stage.step().unwrap_or(Step::ResyncFolder);
    let created = match &compensation {
      Some(c) => c.failed.clone(),
      None => self.created,
    };
    IssuanceError::StoreFailed {
      step,
      created,
      compensation,
      source,
    }
  }
}
