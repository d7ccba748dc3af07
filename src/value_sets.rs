//! Code → display-name tables for the coded HCERT fields.
//!
//! The tables follow the ehn-dcc value-set files, one file per category:
//! ```text
//! { "valueSetId": "...", "valueSetValues": { "<code>": { "display": "<name>", ... } } }
//! ```
//! Codes that no table knows are shown verbatim.

use std::collections::HashMap;
#[cfg(feature = "json")]
use std::path::Path;

#[cfg(feature = "json")]
use serde::Deserialize;

#[cfg(feature = "json")]
use crate::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSet {
    DiseaseAgentTargeted,
    VaccineProphylaxis,
    VaccineMedicinalProduct,
    VaccineManufacturer,
    TestManufacturer,
    Country,
    TestType,
    TestResult,
}

impl ValueSet {
    pub const ALL: [ValueSet; 8] = [
        ValueSet::DiseaseAgentTargeted,
        ValueSet::VaccineProphylaxis,
        ValueSet::VaccineMedicinalProduct,
        ValueSet::VaccineManufacturer,
        ValueSet::TestManufacturer,
        ValueSet::Country,
        ValueSet::TestType,
        ValueSet::TestResult,
    ];

    /// Name of the upstream value-set file.
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self {
            ValueSet::DiseaseAgentTargeted => "disease-agent-targeted.json",
            ValueSet::VaccineProphylaxis => "vaccine-prophylaxis.json",
            ValueSet::VaccineMedicinalProduct => "vaccine-medicinal-product.json",
            ValueSet::VaccineManufacturer => "vaccine-mah-manf.json",
            ValueSet::TestManufacturer => "test-manf.json",
            ValueSet::Country => "country-2-codes.json",
            ValueSet::TestType => "test-type.json",
            ValueSet::TestResult => "test-result.json",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSets {
    tables: HashMap<ValueSet, HashMap<String, String>>,
}

#[cfg(feature = "json")]
#[derive(Deserialize)]
struct ValueSetFile {
    #[serde(rename = "valueSetValues")]
    values: HashMap<String, ValueSetEntry>,
}

#[cfg(feature = "json")]
#[derive(Deserialize)]
struct ValueSetEntry {
    display: Option<String>,
}

impl ValueSets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, set: ValueSet, code: impl Into<String>, display: impl Into<String>) {
        self.tables
            .entry(set)
            .or_default()
            .insert(code.into(), display.into());
    }

    /// Display name of `code`, or `code` itself when unknown.
    #[must_use]
    pub fn resolve(&self, set: ValueSet, code: &str) -> String {
        self.tables
            .get(&set)
            .and_then(|table| table.get(code))
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    #[must_use]
    pub fn len(&self, set: ValueSet) -> usize {
        self.tables.get(&set).map_or(0, HashMap::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(HashMap::is_empty)
    }

    /// Loads one value-set file into the table for `set`.
    /// Entries without a display name are skipped.
    #[cfg(feature = "json")]
    pub fn load_json(&mut self, set: ValueSet, json: &[u8]) -> Result<usize, LoadError> {
        let file: ValueSetFile = serde_json::from_slice(json)?;
        let table = self.tables.entry(set).or_default();
        let before = table.len();
        for (code, entry) in file.values {
            match entry.display {
                Some(display) => {
                    table.insert(code, display);
                }
                None => log::debug!("Value set {:?} has no display name for {code}", set),
            }
        }
        Ok(table.len() - before)
    }

    /// Loads every known value-set file found in `dir`.
    /// Missing files leave their category empty.
    #[cfg(feature = "json")]
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        let mut sets = ValueSets::new();
        for set in ValueSet::ALL {
            let path = dir.as_ref().join(set.file_name());
            match std::fs::read(&path) {
                Ok(json) => {
                    let loaded = sets.load_json(set, &json)?;
                    log::trace!("Loaded {loaded} codes from {}", path.display());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::warn!("Value set {} not found, codes shown verbatim", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(sets)
    }
}
