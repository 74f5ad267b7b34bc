use crate::core::geometry::GeometryStore;
use crate::domain::model::{JurisdictionTax, TaxTable};
use crate::domain::ports::TaxLookup;
use crate::utils::error::{EtlError, Result};
use geo_types::Point;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Name used when the winning feature carries no `NAME` property.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Resolves a coordinate to the tax record of the jurisdiction containing it.
///
/// When jurisdictions overlap, the feature loaded first wins, whatever order
/// the index yields its candidates in.
pub struct JurisdictionResolver {
    store: GeometryStore,
    taxes: TaxTable,
}

impl JurisdictionResolver {
    pub fn new(store: GeometryStore, taxes: TaxTable) -> Self {
        let known: HashSet<&str> = store.features().filter_map(|f| f.name()).collect();
        let unmatched = taxes
            .keys()
            .filter(|name| !known.contains(name.as_str()))
            .count();
        if unmatched > 0 {
            tracing::warn!(
                unmatched,
                "Tax table has jurisdictions with no matching boundary feature"
            );
        }

        Self { store, taxes }
    }

    pub fn store(&self) -> &GeometryStore {
        &self.store
    }

    /// Index of the first-loaded feature that truly contains the point.
    pub fn locate(&self, longitude: f64, latitude: f64) -> Option<usize> {
        let point = Point::new(longitude, latitude);
        lowest_matching(self.store.candidates(longitude, latitude), |idx| {
            self.store
                .feature(idx)
                .map(|feature| feature.contains(&point))
                .unwrap_or(false)
        })
    }

    /// Jurisdiction name at the point, `"Unknown"` for an unnamed feature.
    pub fn jurisdiction_name(&self, longitude: f64, latitude: f64) -> Option<&str> {
        let idx = self.locate(longitude, latitude)?;
        let name = self
            .store
            .feature(idx)
            .and_then(|feature| feature.name())
            .unwrap_or(UNKNOWN_NAME);
        Some(name)
    }

    pub fn resolve(&self, longitude: f64, latitude: f64) -> Option<&JurisdictionTax> {
        let name = self.jurisdiction_name(longitude, latitude)?;
        let tax = self.taxes.get(name);
        if tax.is_none() {
            tracing::debug!(name, "Jurisdiction has no tax configuration");
        }
        tax
    }
}

impl TaxLookup for JurisdictionResolver {
    fn tax_for(&self, longitude: f64, latitude: f64) -> Option<&JurisdictionTax> {
        self.resolve(longitude, latitude)
    }
}

/// Smallest candidate index accepted by `contains`. Candidates at or above
/// the current best are skipped without running the exact test.
fn lowest_matching<I, F>(candidates: I, contains: F) -> Option<usize>
where
    I: IntoIterator<Item = usize>,
    F: Fn(usize) -> bool,
{
    let mut best: Option<usize> = None;
    for idx in candidates {
        if best.is_some_and(|b| idx >= b) {
            continue;
        }
        if contains(idx) {
            best = Some(idx);
        }
    }
    best
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaxConfigJson {
    Wrapped { jurisdictions: TaxTable },
    Bare(TaxTable),
}

/// Parses the jurisdiction tax configuration, either
/// `{"jurisdictions": {...}}` or a bare name → tax map.
pub fn parse_tax_table(content: &str) -> Result<TaxTable> {
    let parsed: TaxConfigJson = serde_json::from_str(content)?;
    Ok(match parsed {
        TaxConfigJson::Wrapped { jurisdictions } => jurisdictions,
        TaxConfigJson::Bare(table) => table,
    })
}

pub fn load_tax_table<P: AsRef<Path>>(path: P) -> Result<TaxTable> {
    let content = std::fs::read_to_string(&path)?;
    let table = parse_tax_table(&content).map_err(|e| EtlError::ConfigValidationError {
        field: "data.jurisdictions".to_string(),
        message: e.to_string(),
    })?;
    tracing::info!(
        path = %path.as_ref().display(),
        jurisdictions = table.len(),
        "Loaded jurisdiction tax table"
    );
    Ok(table)
}
