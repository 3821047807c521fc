//! Mapping of HTTP outcomes onto [`StoreError`].

use ddcc_core::{OperationOutcome, StoreError};
use reqwest::StatusCode;
use serde_json::Value;

pub(crate) fn map_transport_error(error: reqwest::Error) -> StoreError {
  if error.is_timeout() {
    StoreError::Timeout
  } else {
    StoreError::Transport(error.to_string())
  }
}

/// Map a non-success status. 4xx carry the server's OperationOutcome when it
/// sent one; everything else is a transport failure.
pub(crate) fn map_status_error(status: StatusCode, body: &[u8]) -> StoreError {
  if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
    return StoreError::Timeout;
  }
  if status.is_client_error() {
    let outcome = serde_json::from_slice::<Value>(body)
      .ok()
      .as_ref()
      .and_then(OperationOutcome::from_body)
      .unwrap_or_else(|| OperationOutcome::error("processing", status_message(status, body)));
    return StoreError::Rejected {
      status: status.as_u16(),
      outcome,
    };
  }
  StoreError::Transport(status_message(status, body))
}

/// Decode a success body. An OperationOutcome in place of the resource is a
/// rejection.
pub(crate) fn decode_body(status: StatusCode, body: &[u8]) -> Result<Value, StoreError> {
  let value: Value = serde_json::from_slice(body)
    .map_err(|e| StoreError::Transport(format!("invalid JSON from store: {e}")))?;
  if let Some(outcome) = OperationOutcome::from_body(&value) {
    return Err(StoreError::Rejected {
      status: status.as_u16(),
      outcome,
    });
  }
  Ok(value)
}

fn status_message(status: StatusCode, body: &[u8]) -> String {
  let preview = body_preview(body);
  if preview.is_empty() {
    format!("status {}", status.as_u16())
  } else {
    format!("status {}: {}", status.as_u16(), preview)
  }
}

fn body_preview(body: &[u8]) -> String {
  const PREVIEW_CHAR_LIMIT: usize = 160;

  let compact = String::from_utf8_lossy(body)
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ");
  let preview: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
  if compact.chars().count() > PREVIEW_CHAR_LIMIT {
    format!("{preview}...")
  } else {
    preview
  }
}
