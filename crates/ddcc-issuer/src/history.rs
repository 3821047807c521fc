//! Dose history selection for a certificate's scope.

use std::time::Duration;

use ddcc_core::{
  DoseRecord, Resource, ResourceStore, ResourceType, SearchQuery, StoreError,
  VaccineCatalog, VaccineClassification, resource::Immunization,
};

use crate::deadline::within;

/// The Immunization search for a patient's history in one scope.
pub fn history_query(patient_id: &str, classification: &VaccineClassification) -> SearchQuery {
  let query = SearchQuery::new()
    .param("patient", format!("Patient/{patient_id}"))
    .param("_sort", "date");
  if classification.is_routine {
    query
  } else {
    query.param("vaccine-code", classification.vaccine_code.clone())
  }
}

/// Fetch and select the doses a certificate lists. Entries that fail to
/// decode are skipped.
pub async fn load_dose_history<S>(
  store: &S,
  catalog: &VaccineCatalog,
  patient_id: &str,
  classification: &VaccineClassification,
  limit: Duration,
) -> Result<Vec<DoseRecord>, StoreError>
where
  S: ResourceStore + ?Sized,
{
  let query = history_query(patient_id, classification);
  let set = within(limit, store.search(ResourceType::Immunization, &query)).await?;

  let events: Vec<Immunization> = set
    .entries
    .into_iter()
    .filter_map(|body| match Immunization::decode(body) {
      Ok(imm) => Some(imm),
      Err(error) => {
        tracing::warn!(%patient_id, %error, "skipping undecodable immunization in history");
        None
      }
    })
    .collect();

  Ok(select_doses(&events, catalog, classification))
}

/// Apply the scope rules to a patient's immunizations.
///
/// Void events (`entered-in-error`, `not-done`) are dropped. Routine scope
/// keeps every code that is not a known non-routine vaccine; a non-routine
/// scope keeps only its own code. Rows are ordered by occurrence, then id.
pub fn select_doses(
  events: &[Immunization],
  catalog: &VaccineCatalog,
  classification: &VaccineClassification,
) -> Vec<DoseRecord> {
  let mut doses: Vec<DoseRecord> = events
    .iter()
    .filter(|imm| !imm.is_void())
    .filter_map(|imm| {
      let code = imm.vaccine_code()?;
      let in_scope = if classification.is_routine {
        catalog.is_routine(code)
      } else {
        code == classification.vaccine_code
      };
      in_scope.then(|| DoseRecord {
        immunization_id: imm.id.clone(),
        vaccine_code:    code.to_owned(),
        vaccine_name:    catalog
          .display_name(code)
          .or(imm.vaccine_code.text.as_deref())
          .unwrap_or(code)
          .to_owned(),
        dose_quantity:   imm.dose_quantity.as_ref().and_then(|q| q.value),
        occurred_on:     imm.occurred_on(),
      })
    })
    .collect();

  doses.sort_by(|a, b| {
    (a.occurred_on.is_none(), a.occurred_on, &a.immunization_id).cmp(&(
      b.occurred_on.is_none(),
      b.occurred_on,
      &b.immunization_id,
    ))
  });
  doses
}
