//! JSON snapshot persistence for the in-memory store.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::storage::memory::MemoryStore;
use crate::storage::types::{StoreError, StoreSnapshot};

/// Write a snapshot via a temporary file and rename, so a crash mid-write
/// never leaves a truncated snapshot behind.
pub fn save_to_file(path: &Path, snapshot: &StoreSnapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, snapshot)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a snapshot. A missing file is not an error.
pub fn load_from_file(path: &Path) -> std::io::Result<Option<StoreSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let snapshot: StoreSnapshot = serde_json::from_reader(reader)?;
    tracing::info!(
        path = %path.display(),
        drivers = snapshot.drivers.len(),
        rides = snapshot.rides.len(),
        pending = snapshot.pending.len(),
        "Loaded store snapshot"
    );
    Ok(Some(snapshot))
}

/// Open a store from `path`, or an empty one if there is nothing to load.
pub fn open_store(path: Option<&Path>) -> Result<MemoryStore, StoreError> {
    let Some(path) = path else {
        return Ok(MemoryStore::new());
    };
    match load_from_file(path) {
        Ok(Some(snapshot)) => Ok(MemoryStore::from_snapshot(snapshot)),
        Ok(None) => Ok(MemoryStore::new()),
        Err(e) => Err(StoreError::Snapshot(format!("{}: {e}", path.display()))),
    }
}

/// Snapshot `store` to `path`.
pub fn persist(store: &MemoryStore, path: &Path) -> Result<(), StoreError> {
    let snapshot = store.snapshot()?;
    save_to_file(path, &snapshot)
        .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
    tracing::debug!(
        path = %path.display(),
        drivers = snapshot.drivers.len(),
        rides = snapshot.rides.len(),
        "Saved store snapshot"
    );
    Ok(())
}

/// Periodically snapshot the store until shutdown, then write a final one.
pub async fn run_snapshot_task(
    store: Arc<MemoryStore>,
    path: PathBuf,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                save_blocking(&store, &path).await;
            }
            _ = shutdown.recv() => {
                save_blocking(&store, &path).await;
                tracing::info!(path = %path.display(), "Final snapshot written");
                break;
            }
        }
    }
}

async fn save_blocking(store: &Arc<MemoryStore>, path: &Path) {
    let store = Arc::clone(store);
    let path = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || persist(&store, &path)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Snapshot failed"),
        Err(e) => tracing::warn!(error = %e, "Snapshot task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::GeoPoint;
    use crate::storage::DriverDirectory;

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = MemoryStore::new();
        store
            .upsert_location(&"d1".into(), GeoPoint::new(0.3135, 32.5811).unwrap())
            .unwrap();
        persist(&store, &path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let restored = open_store(Some(&path)).unwrap();
        assert!(restored.get_driver(&"d1".into()).unwrap().is_some());
    }

    #[test]
    fn missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(Some(&dir.path().join("absent.json"))).unwrap();
        assert!(store.list_drivers().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(open_store(Some(&path)), Err(StoreError::Snapshot(_))));
    }
}
