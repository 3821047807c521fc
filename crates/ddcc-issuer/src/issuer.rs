//! The issuance orchestrator.

use std::{path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use ddcc_core::{
  FetchError, Resource, ResourceStore, ResourceType, SearchQuery, StoreError, VaccineCatalog,
  VaccineClassification, VaccineScope,
  resource::{Composition, FolderIndex, Immunization, Location, Patient},
  store::read_as,
};
use ddcc_render::{CertificateLayout, RenderedCertificate, Renderer};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  IssuerConfig,
  deadline::within,
  error::{Compensation, IssuanceError, ResourceKey, Step},
  folder::FolderIndexManager,
  history::load_dose_history,
  progress::{WriteProgress, WriteStage},
  resources::CertificateDraft,
};

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceStatus {
  Issued { document_ref_id: String },
  AlreadyIssued,
}

#[derive(Debug, Clone)]
pub struct Issuance {
  pub status:      IssuanceStatus,
  pub folder:      FolderIndex,
  /// What the new certificate shows. `None` when nothing was rendered.
  pub certificate: Option<CertificateLayout>,
}

/// The fields of an Immunization the pipeline cannot do without.
struct Trigger {
  immunization_id: String,
  patient_id:      String,
  vaccine_code:    String,
  location_id:     String,
}

// ─── Issuer ──────────────────────────────────────────────────────────────────

/// Runs the issuance pipeline against one store.
///
/// Cheap to clone; the catalog, renderer assets, config and store handle are
/// shared read-only.
pub struct Issuer<S> {
  store:    Arc<S>,
  catalog:  Arc<VaccineCatalog>,
  renderer: Renderer,
  config:   Arc<IssuerConfig>,
  folders:  FolderIndexManager<S>,
}

impl<S> Clone for Issuer<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      catalog:  Arc::clone(&self.catalog),
      renderer: self.renderer.clone(),
      config:   Arc::clone(&self.config),
      folders:  self.folders.clone(),
    }
  }
}

impl<S: ResourceStore> Issuer<S> {
  pub fn new(
    store: Arc<S>,
    catalog: Arc<VaccineCatalog>,
    renderer: Renderer,
    config: IssuerConfig,
  ) -> Self {
    let config = Arc::new(config);
    let folders = FolderIndexManager::new(Arc::clone(&store), Arc::clone(&config));
    Self {
      store,
      catalog,
      renderer,
      config,
      folders,
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn catalog(&self) -> &VaccineCatalog { &self.catalog }

  pub fn folders(&self) -> &FolderIndexManager<S> { &self.folders }

  pub fn config(&self) -> &IssuerConfig { &self.config }

  fn limit(&self) -> Duration { self.config.store_timeout() }

  /// Issue the certificate for one Immunization event.
  pub async fn issue_certificate(&self, immunization_id: &str) -> Result<Issuance, IssuanceError> {
    let trigger = self.read_trigger(immunization_id).await?;
    let classification = self
      .catalog
      .classify(&trigger.vaccine_code)
      .map_err(|_| IssuanceError::InvalidVaccineCode(trigger.vaccine_code.clone()))?;
    let scope = classification.scope();

    let patient_id = trigger.patient_id.as_str();

    if self.already_issued(&trigger, &scope).await? {
      tracing::info!(
        %immunization_id,
        %patient_id,
        scope = %scope,
        "certificate already issued; resyncing folder"
      );
      let folder = self.resync(&trigger.patient_id, &scope, Vec::new()).await?;
      return Ok(Issuance {
        status: IssuanceStatus::AlreadyIssued,
        folder,
        certificate: None,
      });
    }

    let patient = self.read_patient(&trigger.patient_id).await?;
    let location = self.read_location(&trigger.location_id).await?;

    let document_ref_id = Uuid::new_v4().to_string();
    let rendered = self
      .render(&patient, &classification, &document_ref_id)
      .await?;

    let draft = CertificateDraft {
      config:          &self.config,
      document_ref_id: &document_ref_id,
      immunization_id: &trigger.immunization_id,
      patient:         &patient,
      classification:  &classification,
      issued_at:       Utc::now(),
    };
    let progress = self.persist(&draft, &location, &rendered).await?;

    if let Some(dir) = &self.config.archive_dir {
      archive(dir, &document_ref_id, &rendered.bytes).await;
    }

    let folder = self
      .resync(&trigger.patient_id, &scope, progress.created().to_vec())
      .await?;
    tracing::info!(
      %immunization_id,
      %patient_id,
      scope = %scope,
      %document_ref_id,
      "certificate issued"
    );
    Ok(Issuance {
      status: IssuanceStatus::Issued { document_ref_id },
      folder,
      certificate: Some(rendered.layout),
    })
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn read_trigger(&self, immunization_id: &str) -> Result<Trigger, IssuanceError> {
    let malformed = |reason: &str| IssuanceError::MalformedImmunization {
      id:     immunization_id.to_owned(),
      reason: reason.to_owned(),
    };

    let imm = match within(self.limit(), read_as::<Immunization, _>(&*self.store, immunization_id)).await {
      Ok(Some(imm)) => imm,
      Ok(None) => return Err(IssuanceError::ImmunizationNotFound(immunization_id.to_owned())),
      Err(FetchError::Decode(e)) => return Err(malformed(&e.to_string())),
      Err(FetchError::Store(e)) => return Err(IssuanceError::store(Step::ReadImmunization, e)),
    };

    Ok(Trigger {
      patient_id:      imm
        .patient_id()
        .ok_or_else(|| malformed("no patient reference"))?
        .to_owned(),
      vaccine_code:    imm
        .vaccine_code()
        .ok_or_else(|| malformed("no vaccine code"))?
        .to_owned(),
      location_id:     imm
        .location_id()
        .ok_or_else(|| malformed("no location reference"))?
        .to_owned(),
      immunization_id: imm.id,
    })
  }

  /// True if a Composition in scope already certifies this event.
  async fn already_issued(&self, trigger: &Trigger, scope: &VaccineScope) -> Result<bool, IssuanceError> {
    let query = SearchQuery::new()
      .param("subject", format!("Patient/{}", trigger.patient_id))
      .param("type", scope.key());
    let set = within(self.limit(), self.store.search(ResourceType::Composition, &query))
      .await
      .map_err(|e| IssuanceError::store(Step::DedupCheck, e))?;

    Ok(set.entries.into_iter().any(|body| match Composition::decode(body) {
      Ok(c) => c.certifies(&trigger.immunization_id),
      Err(error) => {
        tracing::warn!(%error, "skipping undecodable composition in dedup check");
        false
      }
    }))
  }

  async fn read_patient(&self, patient_id: &str) -> Result<Patient, IssuanceError> {
    match within(self.limit(), read_as::<Patient, _>(&*self.store, patient_id)).await {
      Ok(Some(p)) => Ok(p),
      Ok(None) | Err(FetchError::Store(StoreError::Rejected { .. })) => {
        Err(IssuanceError::PatientNotFound(patient_id.to_owned()))
      }
      Err(FetchError::Decode(e)) => Err(IssuanceError::MalformedPatient {
        id:     patient_id.to_owned(),
        reason: e.to_string(),
      }),
      Err(FetchError::Store(e)) => Err(IssuanceError::store(Step::ReadPatient, e)),
    }
  }

  async fn read_location(&self, location_id: &str) -> Result<Location, IssuanceError> {
    match within(self.limit(), read_as::<Location, _>(&*self.store, location_id)).await {
      Ok(Some(l)) => Ok(l),
      Ok(None) => Err(IssuanceError::FacilityNotFound(location_id.to_owned())),
      Err(FetchError::Decode(error)) => {
        tracing::warn!(%location_id, %error, "location is unreadable");
        Err(IssuanceError::FacilityNotFound(location_id.to_owned()))
      }
      Err(FetchError::Store(e)) => Err(IssuanceError::store(Step::ReadLocation, e)),
    }
  }

  // ── Render ────────────────────────────────────────────────────────────────

  async fn render(
    &self,
    patient: &Patient,
    classification: &VaccineClassification,
    document_ref_id: &str,
  ) -> Result<RenderedCertificate, IssuanceError> {
    let history = load_dose_history(
      &*self.store,
      &self.catalog,
      &patient.id,
      classification,
      self.limit(),
    )
    .await
    .map_err(|e| IssuanceError::store(Step::LoadHistory, e))?;

    let patient_id = patient.id.clone();
    let renderer = self.renderer.clone();
    let patient = patient.clone();
    let classification = classification.clone();
    let url = self.config.verification_url(document_ref_id);
    let rendered = tokio::task::spawn_blocking(move || {
      renderer.render(&patient, &classification, &history, &url)
    })
    .await
    .map_err(|e| IssuanceError::RenderFailed(e.to_string()))?;

    rendered.map_err(|e| match e {
      ddcc_render::Error::NoDoseHistory => IssuanceError::NoDoseHistory,
      ddcc_render::Error::MalformedPatient(reason) => IssuanceError::MalformedPatient {
        id: patient_id,
        reason,
      },
      other => IssuanceError::RenderFailed(other.to_string()),
    })
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Write Organization → Composition → Binary → Bundle → DocumentReference.
  async fn persist(
    &self,
    draft: &CertificateDraft<'_>,
    location: &Location,
    rendered: &RenderedCertificate,
  ) -> Result<WriteProgress, IssuanceError> {
    let mut progress = WriteProgress::new();
    match self.write_all(draft, location, rendered, &mut progress).await {
      Ok(()) => Ok(progress),
      Err(source) => {
        tracing::error!(
          stage = ?progress.stage(),
          created = progress.created().len(),
          error = %source,
          "certificate write sequence failed"
        );
        let compensation = if self.config.rollback_on_failure {
          let mut targets = progress.created().to_vec();
          // The PUT may have committed before its response was lost.
          if progress.stage() == WriteStage::DocumentReference {
            targets.push(ResourceKey::new(
              ResourceType::DocumentReference,
              draft.document_ref_id,
            ));
          }
          Some(self.compensate(&targets).await)
        } else {
          None
        };
        Err(progress.fail(source, compensation))
      }
    }
  }

  async fn write_all(
    &self,
    draft: &CertificateDraft<'_>,
    location: &Location,
    rendered: &RenderedCertificate,
    progress: &mut WriteProgress,
  ) -> Result<(), StoreError> {
    let organization = self.create(ResourceType::Organization, draft.organization(location)).await?;
    progress.record(&organization.0);

    let composition = self
      .create(ResourceType::Composition, draft.composition(&organization.0))
      .await?;
    progress.record(&composition.0);

    let binary = self.create(ResourceType::Binary, draft.binary(rendered)).await?;
    progress.record(&binary.0);

    let bundle_body = draft.bundle(&composition.1, &organization.1, &binary.0, rendered.content_type);
    let bundle = self.create(ResourceType::Bundle, bundle_body).await?;
    progress.record(&bundle.0);

    let doc = draft.document_reference(&organization.0, &binary.0, &bundle.0, rendered.content_type);
    within(
      self.limit(),
      self
        .store
        .update(ResourceType::DocumentReference, draft.document_ref_id, doc),
    )
    .await?;
    progress.record(draft.document_ref_id);
    Ok(())
  }

  async fn create(&self, resource_type: ResourceType, body: Value) -> Result<(String, Value), StoreError> {
    let created = within(self.limit(), self.store.create(resource_type, body)).await?;
    Ok((created.id, created.body))
  }

  /// Delete `created` in reverse order. Failures are logged and reported.
  async fn compensate(&self, created: &[ResourceKey]) -> Compensation {
    let mut report = Compensation::default();
    for key in created.iter().rev() {
      match within(self.limit(), self.store.delete(key.resource_type, &key.id)).await {
        Ok(()) => report.deleted.push(key.clone()),
        Err(error) => {
          tracing::error!(resource = %key, %error, "compensating delete failed");
          report.failed.push(key.clone());
        }
      }
    }
    tracing::warn!(
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "rolled back partial issuance"
    );
    report
  }

  async fn resync(
    &self,
    patient_id: &str,
    scope: &VaccineScope,
    created: Vec<ResourceKey>,
  ) -> Result<FolderIndex, IssuanceError> {
    self
      .folders
      .resync(patient_id, scope)
      .await
      .map_err(|e| IssuanceError::StoreFailed {
        step: Step::ResyncFolder,
        created,
        compensation: None,
        source: e.into_store_error(),
      })
  }
}

/// Best-effort copy of the rendered PDF to disk.
async fn archive(dir: &Path, document_ref_id: &str, bytes: &[u8]) {
  let path = dir.join(format!("{document_ref_id}.pdf"));
  let result = async {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, bytes).await
  }
  .await;
  match result {
    Ok(()) => tracing::debug!(path = %path.display(), "archived certificate"),
    Err(error) => tracing::warn!(path = %path.display(), %error, "could not archive certificate"),
  }
}
