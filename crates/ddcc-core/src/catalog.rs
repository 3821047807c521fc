//! The static vaccine catalog: code → display name and routine flag.
//!
//! The built-in table covers the national (NHDD) codes and the immunization
//! programme codes used by the registry. Deployments may replace it with a
//! JSON file at startup; the catalog is never mutated afterwards.

use std::{collections::BTreeMap, fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const BUILTIN: &[(&str, &str, bool)] = &[
  // National codes
  ("10517", "BCG", true),
  ("29659", "HPV", true),
  ("24014", "Measles - Rubella", true),
  ("3573", "Pneumococcal", true),
  ("2763", "Rotavirus", true),
  ("2748", "Rubella", true),
  ("3549", "Inactivated Polio", true),
  ("54379", "Bivalent Polio", true),
  ("54377", "Oral Polio", true),
  ("15846", "Malaria", true),
  ("1107", "Vitamin A", true),
  ("50732", "Tdap", true),
  ("18035", "Tdap", true),
  ("11742", "Albendazole", true),
  ("1002", "Yellow Fever", false),
  ("13809", "Rabies Post Exposure", false),
  ("6306", "Influenza", false),
  ("14676", "Tetanus", false),
  ("16927", "Covid 19 Astrazeneca", false),
  ("16929", "Covid 19 Pfizer-BioNTech", false),
  ("16931", "Covid 19 Moderna", false),
  ("16489", "Covid 19 Sinopharm", false),
  ("16537", "Covid 19 Johnson", false),
  // Programme codes
  ("IMBCG-I", "BCG", true),
  ("IMPO-bOPV", "OPV Birth Dose", true),
  ("IMPO-OPV-I", "OPV 1", true),
  ("IMPO-OPV-II", "OPV 2", true),
  ("IMPO-OPV-III", "OPV 3", true),
  ("IMPO-IPV I", "IPV", true),
  ("IMDPT-1", "DPT-HepB-Hib 1", true),
  ("IMDPT-2", "DPT-HepB-Hib 2", true),
  ("IMDPT-3", "DPT-HepB-Hib 3", true),
  ("IMPCV10-1", "PCV10 1", true),
  ("IMPCV10-2", "PCV10 2", true),
  ("IMPCV10-3", "PCV10 3", true),
  ("IMROTA-1", "Rota 1", true),
  ("IMROTA-2", "Rota 2", true),
  ("IMROTA-3", "Rota 3", true),
  ("IMVIT-1", "Vitamin A", true),
  ("IMMEAS-0", "Measles-Rubella 1", true),
  ("IMMEAS-1", "Measles-Rubella 2", true),
  ("IMYF-I", "Yellow Fever", false),
];

// ─── Classification ──────────────────────────────────────────────────────────

/// What the catalog knows about one vaccine code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccineClassification {
  pub vaccine_code: String,
  pub display_name: String,
  pub is_routine:   bool,
}

impl VaccineClassification {
  pub fn scope(&self) -> VaccineScope {
    if self.is_routine {
      VaccineScope::Routine
    } else {
      VaccineScope::NonRoutine(self.vaccine_code.clone())
    }
  }
}

/// The folder a certificate belongs to: all routine vaccines together, or
/// one folder per non-routine vaccine code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VaccineScope {
  Routine,
  NonRoutine(String),
}

impl VaccineScope {
  pub const ROUTINE_KEY: &'static str = "routine";

  /// The coding code stored on Composition, DocumentReference and List.
  pub fn key(&self) -> &str {
    match self {
      Self::Routine => Self::ROUTINE_KEY,
      Self::NonRoutine(code) => code,
    }
  }

  pub fn from_key(key: &str) -> Self {
    if key == Self::ROUTINE_KEY {
      Self::Routine
    } else {
      Self::NonRoutine(key.to_owned())
    }
  }

  pub fn is_routine(&self) -> bool { matches!(self, Self::Routine) }
}

impl fmt::Display for VaccineScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
  pub code:    String,
  pub display: String,
  pub routine: bool,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
  vaccines: Vec<CatalogEntry>,
}

#[derive(Debug, Clone)]
pub struct VaccineCatalog {
  entries: BTreeMap<String, CatalogEntry>,
}

impl Default for VaccineCatalog {
  fn default() -> Self { Self::builtin() }
}

impl VaccineCatalog {
  pub fn builtin() -> Self {
    Self::from_entries(BUILTIN.iter().map(|(code, display, routine)| {
      CatalogEntry {
        code:    (*code).to_owned(),
        display: (*display).to_owned(),
        routine: *routine,
      }
    }))
  }

  pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
    Self {
      entries: entries.into_iter().map(|e| (e.code.clone(), e)).collect(),
    }
  }

  /// Load a catalog from `{"vaccines": [{"code", "display", "routine"}]}`.
  pub fn from_json_file(path: &Path) -> Result<Self> {
    let text = std::fs::read_to_string(path)?;
    let file: CatalogFile = serde_json::from_str(&text)?;
    Ok(Self::from_entries(file.vaccines))
  }

  /// Look up a code. Unknown or blank codes are an error.
  pub fn classify(&self, code: &str) -> Result<VaccineClassification> {
    let entry = self
      .entries
      .get(code.trim())
      .ok_or_else(|| Error::InvalidVaccineCode(code.to_owned()))?;
    Ok(VaccineClassification {
      vaccine_code: entry.code.clone(),
      display_name: entry.display.clone(),
      is_routine:   entry.routine,
    })
  }

  pub fn display_name(&self, code: &str) -> Option<&str> {
    self.entries.get(code).map(|e| e.display.as_str())
  }

  /// True unless `code` is a known non-routine vaccine. Codes the catalog
  /// does not know are treated as routine history.
  pub fn is_routine(&self, code: &str) -> bool {
    self.entries.get(code).is_none_or(|e| e.routine)
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
