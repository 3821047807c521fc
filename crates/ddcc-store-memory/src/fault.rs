//! Operation kinds and injectable faults.

use std::time::Duration;

use ddcc_core::{ResourceType, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
  Create,
  Read,
  Update,
  Search,
  Delete,
}

/// What happens when an armed fault fires.
#[derive(Debug, Clone)]
pub enum Fault {
  /// Fail the call with this error.
  Fail(StoreError),
  /// Sleep before running the call normally.
  Delay(Duration),
  /// Run the call, then fail it with this error as if the response was lost
  /// after the store committed.
  Lost(StoreError),
}

impl Fault {
  pub fn transport(message: &str) -> Self {
    Self::Fail(StoreError::Transport(message.to_owned()))
  }

  pub fn rejected(status: u16, text: &str) -> Self {
    Self::Fail(StoreError::rejected(status, "invalid", text))
  }
}

/// A fault waiting for its call. `skip` counts matching calls still to let
/// through before it fires.
#[derive(Debug, Clone)]
pub(crate) struct Armed {
  pub op:            Op,
  pub resource_type: ResourceType,
  pub skip:          usize,
  pub fault:         Fault,
}

impl Armed {
  pub fn matches(&self, op: Op, resource_type: ResourceType) -> bool {
    self.op == op && self.resource_type == resource_type
  }
}
