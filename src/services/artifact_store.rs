use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::models::intent::ArtifactKind;

/// Durable byte storage for captured media.
///
/// A capture lives at a transient URI owned by the capture UI until
/// [`persist`](ArtifactStore::persist) copies it into the store, after which
/// the store owns it until confirmed delivery. Knows nothing about the
/// network or the journal.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Generate a store-unique artifact name: UTC timestamp plus a random
    /// suffix, so two captures in the same millisecond cannot collide.
    pub fn generate_name(kind: ArtifactKind) -> String {
        format!(
            "{}-{}.{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3f"),
            Uuid::new_v4().simple(),
            kind.extension()
        )
    }

    /// Copy the bytes at `transient` into durable storage under `name`.
    ///
    /// Writes to a temp file, fsyncs, then renames, so the artifact is either
    /// fully present under `name` or not present at all, and is durable
    /// before this returns. Persisting the same name twice overwrites.
    pub async fn persist(&self, transient: &Path, name: &str) -> Result<(), StorageError> {
        let dest = self.path_for(name);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.root.join(format!("{name}.tmp"));
        fs::copy(transient, &tmp).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::SourceMissing(transient.to_path_buf())
            } else {
                StorageError::Io(e)
            }
        })?;

        let file = fs::File::open(&tmp).await?;
        file.sync_all().await?;
        fs::rename(&tmp, &dest).await?;
        Ok(())
    }

    /// Read an artifact's bytes back for upload.
    pub async fn load(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        fs::read(self.path_for(name)).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    /// Remove an artifact. Already-absent is success, so cleanup is safe to
    /// retry after a crash.
    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.path_for(name)).await.unwrap_or(false)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("transient capture no longer exists: {0}")]
    SourceMissing(PathBuf),

    #[error("artifact not found in store: {0}")]
    NotFound(String),

    #[error("artifact storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("artifacts")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let (dir, store) = store().await;
        let capture = dir.path().join("capture.jpg");
        fs::write(&capture, b"jpeg bytes").await.unwrap();

        store.persist(&capture, "a.jpg").await.unwrap();
        assert!(store.exists("a.jpg").await);
        assert_eq!(store.load("a.jpg").await.unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_persist_overwrites_same_name() {
        let (dir, store) = store().await;
        let first = dir.path().join("one.jpg");
        let second = dir.path().join("two.jpg");
        fs::write(&first, b"one").await.unwrap();
        fs::write(&second, b"two").await.unwrap();

        store.persist(&first, "a.jpg").await.unwrap();
        store.persist(&second, "a.jpg").await.unwrap();
        assert_eq!(store.load("a.jpg").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_persist_missing_source() {
        let (dir, store) = store().await;
        let gone = dir.path().join("never-existed.jpg");

        let err = store.persist(&gone, "a.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::SourceMissing(_)));
        assert!(!store.exists("a.jpg").await);
    }

    #[tokio::test]
    async fn test_delete_is_retry_safe() {
        let (dir, store) = store().await;
        let capture = dir.path().join("capture.png");
        fs::write(&capture, b"sig").await.unwrap();

        store.persist(&capture, "s.png").await.unwrap();
        store.delete("s.png").await.unwrap();
        // second delete of an absent artifact is not an error
        store.delete("s.png").await.unwrap();
        assert!(!store.exists("s.png").await);
    }

    #[tokio::test]
    async fn test_generated_names_are_unique() {
        let a = ArtifactStore::generate_name(ArtifactKind::Image);
        let b = ArtifactStore::generate_name(ArtifactKind::Image);
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
        assert!(ArtifactStore::generate_name(ArtifactKind::Signature).ends_with(".png"));
    }
}
