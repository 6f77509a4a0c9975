//! Storage backends for the prediction store.
//!
//! The on-disk layout is a single JSON object mapping prediction id to record, rewritten
//! wholesale on every mutation. Concurrent writers from separate processes are
//! last-writer-wins.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::PredictionRecord;

/// Load/save hook injected into [`super::PredictionStore`].
pub trait SubmissionPersistence: Send + Sync {
    fn load(&self) -> Result<Vec<PredictionRecord>>;
    fn save(&self, records: &[PredictionRecord]) -> Result<()>;
}

/// JSON document on disk.
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SubmissionPersistence for JsonFilePersistence {
    fn load(&self) -> Result<Vec<PredictionRecord>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no prediction file yet, starting empty");
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: BTreeMap<String, PredictionRecord> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        let mut records = Vec::with_capacity(document.len());
        for (key, mut record) in document {
            let Ok(id) = Uuid::parse_str(&key) else {
                warn!(key = %key, "skipping prediction with malformed id");
                continue;
            };
            if !record.submission.id.is_nil() && record.submission.id != id {
                warn!(key = %key, embedded = %record.submission.id, "record id differs from key, using key");
            }
            record.submission.id = id;
            records.push(record);
        }

        // Object keys come back sorted by id; restore submission order.
        records.sort_by(|a, b| {
            a.submission
                .submission_time
                .cmp(&b.submission.submission_time)
                .then_with(|| a.id().cmp(&b.id()))
        });

        Ok(records)
    }

    fn save(&self, records: &[PredictionRecord]) -> Result<()> {
        let document: BTreeMap<String, &PredictionRecord> = records
            .iter()
            .map(|r| (r.id().to_string(), r))
            .collect();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(&document)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Keeps the last saved snapshot in memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryPersistence {
    snapshot: Mutex<Vec<PredictionRecord>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<PredictionRecord> {
        self.snapshot.lock().clone()
    }
}

impl SubmissionPersistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<PredictionRecord>> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, records: &[PredictionRecord]) -> Result<()> {
        *self.snapshot.lock() = records.to_vec();
        Ok(())
    }
}
