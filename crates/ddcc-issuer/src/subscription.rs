//! Registration of the rest-hook that feeds Immunization events to the
//! pipeline.

use std::time::Duration;

use ddcc_core::{ResourceStore, ResourceType, StoreError};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::deadline::within;

fn default_criteria() -> String { "Immunization?".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
  /// Stable id of the Subscription resource; upserted on startup.
  #[serde(default)]
  pub id:           Option<String>,
  /// Where the store should POST matching resources.
  #[serde(default)]
  pub callback_url: Option<String>,
  #[serde(default = "default_criteria")]
  pub criteria:     String,
  /// Extra `Name: value` header the store sends with every notification.
  #[serde(default)]
  pub header:       Option<String>,
}

impl Default for SubscriptionConfig {
  fn default() -> Self {
    Self {
      id:           None,
      callback_url: None,
      criteria:     default_criteria(),
      header:       None,
    }
  }
}

impl SubscriptionConfig {
  /// The (id, callback) pair, when both are configured.
  pub fn target(&self) -> Option<(&str, &str)> {
    Some((self.id.as_deref()?, self.callback_url.as_deref()?))
  }
}

fn subscription_body(id: &str, endpoint: &str, config: &SubscriptionConfig) -> Value {
  let mut channel = json!({
    "type": "rest-hook",
    "endpoint": endpoint,
    "payload": "application/fhir+json",
  });
  if let (Some(header), Some(obj)) = (&config.header, channel.as_object_mut()) {
    obj.insert("header".into(), json!([header]));
  }
  json!({
    "resourceType": "Subscription",
    "id": id,
    "status": "requested",
    "reason": "Issue digital vaccination certificates",
    "criteria": config.criteria,
    "channel": channel,
  })
}

/// Create or replace the configured Subscription. Returns `Ok(None)` when no
/// subscription is configured.
pub async fn upsert_subscription<S>(
  store: &S,
  config: &SubscriptionConfig,
  limit: Duration,
) -> Result<Option<Value>, StoreError>
where
  S: ResourceStore + ?Sized,
{
  let Some((id, endpoint)) = config.target() else {
    return Ok(None);
  };
  let body = subscription_body(id, endpoint, config);
  let written = within(limit, store.update(ResourceType::Subscription, id, body)).await?;
  tracing::info!(subscription_id = %id, %endpoint, "subscription registered");
  Ok(Some(written))
}
