use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::intent::UploadIntent;

const INDEX_FILE: &str = "index.json";

/// Durable catalogue of pending upload intents.
///
/// One JSON file per intent plus an `index.json` holding creation order, so
/// `list` never has to re-parse the directory. Every write goes through
/// temp-file-then-rename, so a crash mid-write leaves either the old record
/// or the new one, never a torn file. All mutation funnels through one lock;
/// `update` cannot race a concurrent `remove` of the same id.
pub struct IntentJournal {
    dir: PathBuf,
    inner: Mutex<JournalState>,
}

struct JournalState {
    entries: HashMap<Uuid, UploadIntent>,
    order: Vec<Uuid>,
}

impl IntentJournal {
    /// Open the journal at `dir`, creating it if needed and loading any
    /// entries left over from a previous run.
    ///
    /// Corruption is contained here: an unreadable index is rebuilt from the
    /// entry files, an unreadable entry is skipped with a warning, and in the
    /// worst case the journal degrades to empty rather than failing the host.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let order = match Self::read_index(&dir).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(error = %e, dir = %dir.display(), "journal index unreadable, rebuilding from entry files");
                Self::rebuild_index(&dir).await
            }
        };

        let mut entries = HashMap::new();
        let mut kept = Vec::with_capacity(order.len());
        for id in order {
            match Self::read_entry(&dir, id).await {
                Ok(intent) => {
                    entries.insert(id, intent);
                    kept.push(id);
                }
                Err(e) => {
                    tracing::warn!(intent_id = %id, error = %e, "journal entry unreadable, dropping");
                }
            }
        }

        let journal = Self {
            dir,
            inner: Mutex::new(JournalState { entries, order: kept }),
        };
        journal.sweep_stale_entries().await;
        Ok(journal)
    }

    /// Append or replace an intent record durably.
    ///
    /// Entry file first, index second: a crash in between leaves a stale
    /// entry file that the next `open` sweeps, which reads as "the record
    /// never happened" rather than a half-written journal.
    pub async fn record(&self, intent: UploadIntent) -> Result<(), JournalError> {
        let mut state = self.inner.lock().await;
        write_atomic(&self.entry_path(intent.id), &serde_json::to_vec_pretty(&intent)?).await?;

        if !state.order.contains(&intent.id) {
            state.order.push(intent.id);
        }
        state.entries.insert(intent.id, intent);
        self.write_index(&state).await?;
        Ok(())
    }

    /// All pending intents in creation order. The sole source of truth for
    /// what work remains.
    pub async fn list(&self) -> Vec<UploadIntent> {
        let state = self.inner.lock().await;
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id).cloned())
            .collect()
    }

    /// Apply a mutation (attempt count, failure reason) to one intent and
    /// rewrite its record. No-op if the intent was removed in the meantime.
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> Result<(), JournalError>
    where
        F: FnOnce(&mut UploadIntent),
    {
        let mut state = self.inner.lock().await;
        let Some(intent) = state.entries.get_mut(&id) else {
            return Ok(());
        };
        mutate(intent);
        let bytes = serde_json::to_vec_pretty(&*intent)?;
        write_atomic(&self.entry_path(id), &bytes).await?;
        Ok(())
    }

    /// Delete an intent record. No-op if absent, so cleanup is safe to retry.
    ///
    /// Index first, entry file second: a crash in between leaves an
    /// unreferenced entry file for the next `open` to sweep, never an index
    /// pointing at nothing.
    pub async fn remove(&self, id: Uuid) -> Result<(), JournalError> {
        let mut state = self.inner.lock().await;
        if state.entries.remove(&id).is_none() {
            return Ok(());
        }
        state.order.retain(|other| *other != id);
        self.write_index(&state).await?;

        match fs::remove_file(self.entry_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JournalError::Io(e)),
        }
    }

    /// Number of pending intents.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn entry_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id.simple()))
    }

    async fn write_index(&self, state: &JournalState) -> Result<(), JournalError> {
        write_atomic(&self.dir.join(INDEX_FILE), &serde_json::to_vec_pretty(&state.order)?).await
    }

    async fn read_index(dir: &Path) -> Result<Vec<Uuid>, JournalError> {
        let bytes = fs::read(dir.join(INDEX_FILE)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn read_entry(dir: &Path, id: Uuid) -> Result<UploadIntent, JournalError> {
        let bytes = fs::read(dir.join(format!("{}.json", id.simple()))).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Best-effort recovery when the index is lost: every parseable entry
    /// file becomes a pending intent again, ordered by creation time.
    async fn rebuild_index(dir: &Path) -> Vec<Uuid> {
        let mut recovered: Vec<UploadIntent> = Vec::new();
        let Ok(mut read_dir) = fs::read_dir(dir).await else {
            return Vec::new();
        };
        while let Ok(Some(dirent)) = read_dir.next_entry().await {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == INDEX_FILE || !name.ends_with(".json") {
                continue;
            }
            let Some(id) = name
                .strip_suffix(".json")
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                continue;
            };
            match Self::read_entry(dir, id).await {
                Ok(intent) => recovered.push(intent),
                Err(e) => {
                    tracing::warn!(intent_id = %id, error = %e, "journal entry unreadable during index rebuild, dropping");
                }
            }
        }
        recovered.sort_by_key(|intent| intent.created_at);
        recovered.into_iter().map(|intent| intent.id).collect()
    }

    /// Delete entry files the loaded index does not reference. These are
    /// leftovers of a `record` or `remove` interrupted between its two
    /// writes; the index state is the one that counts.
    async fn sweep_stale_entries(&self) {
        let state = self.inner.lock().await;
        let Ok(mut read_dir) = fs::read_dir(&self.dir).await else {
            return;
        };
        while let Ok(Some(dirent)) = read_dir.next_entry().await {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == INDEX_FILE || !name.ends_with(".json") {
                continue;
            }
            let referenced = name
                .strip_suffix(".json")
                .and_then(|stem| Uuid::parse_str(stem).ok())
                .is_some_and(|id| state.entries.contains_key(&id));
            if !referenced {
                tracing::debug!(file = name, "sweeping stale journal entry file");
                let _ = fs::remove_file(dirent.path()).await;
            }
        }
    }
}

/// Write `bytes` to `path` via temp file, fsync, and atomic rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), JournalError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    let file = fs::File::open(&tmp).await?;
    file.sync_all().await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
