//! JSON persistence: the batch checkpoint, the master list and per-place
//! records. Every write replaces the target file atomically.

use crate::model::{Record, WorkItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collector_core::{Error, Result};
use metrics::counter;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable home of the batch checkpoint. The batch processor is its only writer.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Previously completed items, empty when nothing was saved yet.
    async fn load(&self) -> Result<Vec<WorkItem>>;

    /// Replaces the stored checkpoint with `items`.
    async fn save(&self, items: &[WorkItem]) -> Result<()>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn persistence_error(path: &Path, details: impl ToString) -> Error {
    Error::Persistence {
        path: path.display().to_string(),
        details: details.to_string(),
    }
}

/// Writes `contents` next to `path` and renames it into place, so readers
/// never observe a partially written file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| persistence_error(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| persistence_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| persistence_error(path, e))?;
    Ok(())
}

#[async_trait]
impl CheckpointStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<WorkItem>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(persistence_error(&self.path, e)),
        };

        serde_json::from_slice(&raw).map_err(|e| persistence_error(&self.path, e))
    }

    async fn save(&self, items: &[WorkItem]) -> Result<()> {
        let raw = serde_json::to_vec_pretty(items)?;
        write_atomic(&self.path, &raw).await?;
        counter!("collector_checkpoint_writes_total").increment(1);
        debug!(path = %self.path.display(), items = items.len(), "Checkpoint saved");
        Ok(())
    }
}

/// Reads the batch master list. Codes must be unique.
pub async fn load_master_list(path: &Path) -> Result<Vec<WorkItem>> {
    let raw = tokio::fs::read(path).await?;
    let items: Vec<WorkItem> = serde_json::from_slice(&raw)?;

    let mut seen = HashSet::with_capacity(items.len());
    if let Some(dup) = items.iter().find(|item| !seen.insert(item.code.as_str())) {
        return Err(Error::Validation(format!(
            "duplicate code {:?} in master list {}",
            dup.code,
            path.display()
        )));
    }

    Ok(items)
}

pub fn record_file_name(place: &str, country: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}.json",
        place.trim().replace(' ', "_"),
        country.trim().replace(' ', "_"),
        at.format("%Y%m%dT%H%M%SZ")
    )
}

/// Saves a single-place record under `out_dir` and returns its path.
pub async fn save_record(record: &Record, out_dir: &Path) -> Result<PathBuf> {
    let country = record.place.country.as_deref().unwrap_or("");
    let path = out_dir.join(record_file_name(&record.place.name, country, record.generated_at));
    let raw = serde_json::to_vec_pretty(record)?;
    write_atomic(&path, &raw).await?;
    Ok(path)
}
