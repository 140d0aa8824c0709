//! JSON file reference store: one `<machine>.json` per machine.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::{MachineReference, ReferenceStore, StoreError};

/// Stores each reference as a flat JSON object under a state directory.
///
/// Writes go to a temporary sibling file which is fsynced and then renamed
/// over the record, so readers see either the old or the new record in full,
/// also after a power loss.
#[derive(Debug, Clone)]
pub struct JsonFileReferenceStore {
    dir: PathBuf,
}

impl JsonFileReferenceStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// State directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `machine`.
    pub fn path_for(&self, machine: &str) -> Result<PathBuf, StoreError> {
        let valid = !machine.is_empty()
            && machine != "."
            && machine != ".."
            && !machine.contains(['/', '\\']);
        if !valid {
            return Err(StoreError::Corrupt(format!(
                "machine name '{machine}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{machine}.json")))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write `body` to `path` through a synced temporary file in `dir`.
fn persist_atomically(dir: &Path, path: &Path, body: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(body).map_err(|e| io_error(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    sync_dir(dir)
}

// The rename itself is only durable once the directory entry is flushed.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    std::fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| io_error(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[async_trait]
impl ReferenceStore for JsonFileReferenceStore {
    async fn read(&self, machine: &str) -> Result<Option<MachineReference>, StoreError> {
        let path = self.path_for(machine)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        let map: BTreeMap<String, String> = serde_json::from_slice(&bytes)?;
        if map.is_empty() {
            return Ok(None);
        }
        MachineReference::from_flat_map(&map).map(Some)
    }

    async fn write(&self, machine: &str, reference: &MachineReference) -> Result<(), StoreError> {
        let path = self.path_for(machine)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let body = serde_json::to_vec_pretty(&reference.to_flat_map())?;
        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || persist_atomically(&dir, &target, &body))
            .await
            .map_err(|e| io_error(&path, std::io::Error::other(e)))??;

        tracing::debug!(machine = %machine, path = %path.display(), "Reference written");
        Ok(())
    }
}
