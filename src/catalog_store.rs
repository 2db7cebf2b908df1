//! Ordered plant catalog backed by a JSON file.
//!
//! The store itself is not synchronized. [`crate::catalog_manager`] owns the
//! single instance and serializes every access to it.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::plant::PlantRecord;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("please input plant name")]
    MissingName,
    #[error("plant already exists")]
    Duplicate,
    #[error("plant {0} not exist")]
    NotFound(String),
    #[error("flushing file error: {0}")]
    Persistence(String),
    #[error("catalog is unavailable")]
    Unavailable,
}

pub struct CatalogStore {
    path: PathBuf,
    records: Vec<PlantRecord>,
}

impl CatalogStore {
    /// Loads the catalog at `path`. A missing or unreadable file starts an
    /// empty catalog.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<PlantRecord>>(&content) {
                Ok(records) => {
                    info!(
                        "Catalog: loaded {} plants from {}",
                        records.len(),
                        path.display()
                    );
                    records
                }
                Err(err) => {
                    warn!(
                        "Catalog: failed to decode {}, starting empty: {err}",
                        path.display()
                    );
                    Vec::new()
                }
            },
            Err(err) => {
                warn!(
                    "Catalog: failed to open {}, starting empty: {err}",
                    path.display()
                );
                Vec::new()
            }
        };
        Self { path, records }
    }

    #[cfg(test)]
    pub(crate) fn with_records(path: impl Into<PathBuf>, records: Vec<PlantRecord>) -> Self {
        Self {
            path: path.into(),
            records,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every stored record in insertion order.
    pub fn list(&self) -> Vec<PlantRecord> {
        self.records.clone()
    }

    /// Classifies `record`, appends it, and rewrites the file. A record
    /// without a common name is refused since it could never be deleted.
    ///
    /// A persistence failure leaves the record appended in memory, so the
    /// next successful write will still include it.
    pub fn add(&mut self, mut record: PlantRecord) -> Result<PlantRecord, CatalogError> {
        if record.common_name.trim().is_empty() {
            return Err(CatalogError::MissingName);
        }
        if self
            .records
            .iter()
            .any(|stored| stored.shares_identity_with(&record))
        {
            return Err(CatalogError::Duplicate);
        }

        record.classify();
        record.candidate_images.clear();
        info!(
            "Catalog: adding plant {} ({})",
            record.common_name, record.latin_name
        );
        self.records.push(record.clone());
        self.persist()?;
        Ok(record)
    }

    /// Removes every record answering to `name` and returns how many went.
    pub fn delete(&mut self, name: &str) -> Result<usize, CatalogError> {
        let before = self.records.len();
        self.records.retain(|record| !record.answers_to(name));
        let removed = before - self.records.len();
        if removed == 0 {
            return Err(CatalogError::NotFound(name.to_string()));
        }

        info!("Catalog: deleted {removed} plant(s) named {name}");
        self.persist()?;
        Ok(removed)
    }

    /// Writes the full catalog as indented JSON. The data goes to a sibling
    /// temp file first and is renamed over the target.
    pub fn persist(&self) -> Result<(), CatalogError> {
        info!("Catalog: flushing {} plants to file", self.records.len());
        let data = serde_json::to_string_pretty(&self.records)
            .map_err(|err| CatalogError::Persistence(err.to_string()))?;

        let mut temp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "plants.json".into());
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        fs::write(&temp_path, data).map_err(|err| {
            CatalogError::Persistence(format!("failed to write {}: {err}", temp_path.display()))
        })?;
        fs::rename(&temp_path, &self.path).map_err(|err| {
            CatalogError::Persistence(format!(
                "failed to replace {}: {err}",
                self.path.display()
            ))
        })
    }
}
