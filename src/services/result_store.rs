use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::outcome::EditOutcome;

/// Fixed slot holding the most recent edit results.
pub const RESULTS_KEY: &str = "edited_results.json";

/// Single-slot persistence for the last edit batch.
pub trait ResultStore {
    /// Reads the slot. Anything that is not a valid outcome list is
    /// deleted and reported as empty.
    fn load(&mut self) -> Vec<EditOutcome>;

    fn save(&mut self, outcomes: &[EditOutcome]) -> Result<(), StoreError>;

    /// Removes the slot; succeeds when it is already absent.
    fn clear(&mut self) -> Result<(), StoreError>;
}

fn parse_snapshot(raw: &str) -> Option<Vec<EditOutcome>> {
    let outcomes: Vec<EditOutcome> = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "stored results are not a valid outcome list");
            return None;
        }
    };

    if outcomes.iter().all(EditOutcome::is_settled) {
        Some(outcomes)
    } else {
        warn!("stored results contain unsettled outcomes");
        None
    }
}

pub struct FileResultStore {
    path: PathBuf,
}

impl FileResultStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(RESULTS_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to delete corrupt results");
        }
    }
}

impl ResultStore for FileResultStore {
    fn load(&mut self) -> Vec<EditOutcome> {
        if !self.path.exists() {
            return Vec::new();
        }

        let data = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read stored results");
                self.discard();
                return Vec::new();
            }
        };

        match parse_snapshot(&data) {
            Some(outcomes) => {
                debug!(count = outcomes.len(), "restored edit results");
                outcomes
            }
            None => {
                self.discard();
                Vec::new()
            }
        }
    }

    fn save(&mut self, outcomes: &[EditOutcome]) -> Result<(), StoreError> {
        let json = serde_json::to_string(outcomes)?;
        write_atomic(&self.path, json.as_bytes())?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);

    if let Some(parent) = tmp.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&tmp, bytes)?;

    if path.exists() {
        fs::remove_file(path)?;
    }

    fs::rename(&tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(n) => n.to_string(),
        None => RESULTS_KEY.to_string(),
    };
    p.set_file_name(format!("{file_name}.tmp"));
    p
}

/// In-memory slot holding the serialized text, like browser storage.
/// Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryResultStore {
    slot: Arc<Mutex<Option<String>>>,
    #[cfg(test)]
    quota: Option<usize>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(raw: impl Into<String>) -> Self {
        let store = Self::default();
        store.set(Some(raw.into()));
        store
    }

    /// Rejects writes whose serialized form exceeds `bytes`.
    #[cfg(test)]
    pub(crate) fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().map(|s| s.clone()).unwrap_or(None)
    }

    fn set(&self, value: Option<String>) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = value;
        }
    }
}

impl ResultStore for MemoryResultStore {
    fn load(&mut self) -> Vec<EditOutcome> {
        let Some(raw) = self.raw() else {
            return Vec::new();
        };

        match parse_snapshot(&raw) {
            Some(outcomes) => outcomes,
            None => {
                self.set(None);
                Vec::new()
            }
        }
    }

    fn save(&mut self, outcomes: &[EditOutcome]) -> Result<(), StoreError> {
        let json = serde_json::to_string(outcomes)?;

        #[cfg(test)]
        if let Some(quota) = self.quota {
            if json.len() > quota {
                return Err(StoreError::QuotaExceeded {
                    needed: json.len(),
                    quota,
                });
            }
        }

        self.set(Some(json));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.set(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<EditOutcome> {
        vec![
            EditOutcome::success("data:image/png;base64,AA==", "data:image/png;base64,AQ=="),
            EditOutcome::failure("data:image/png;base64,Ag==", "rate limited"),
        ]
    }

    #[test]
    fn file_store_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileResultStore::new(dir.path());

        store.save(&sample()).unwrap();
        store.save(&sample()[..1]).unwrap();

        let mut reopened = FileResultStore::new(dir.path());
        assert_eq!(reopened.load(), sample()[..1].to_vec());
        assert!(!dir.path().join(format!("{RESULTS_KEY}.tmp")).exists());
    }

    #[test]
    fn file_store_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileResultStore::new(&dir.path().join("nested"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn file_store_deletes_corrupt_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileResultStore::new(dir.path());
        fs::write(store.path(), r#"{"not":"a list"}"#).unwrap();

        assert!(store.load().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileResultStore::new(dir.path());
        store.save(&sample()).unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn unsettled_outcomes_count_as_corrupt() {
        let mut store = MemoryResultStore::with_raw(r#"[{"original":"data:image/png;base64,AA=="}]"#);
        assert!(store.load().is_empty());
        assert_eq!(store.raw(), None);
    }

    #[test]
    fn memory_store_shares_slot_between_clones() {
        let store = MemoryResultStore::new();
        let mut writer = store.clone();
        writer.save(&sample()).unwrap();

        let mut reader = store.clone();
        assert_eq!(reader.load(), sample());
    }

    #[test]
    fn memory_store_quota() {
        let mut store = MemoryResultStore::new().with_quota(10);
        let err = store.save(&sample()).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { quota: 10, .. }));
        assert_eq!(store.raw(), None);
    }
}
