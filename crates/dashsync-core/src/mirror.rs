//! On-disk copy of the last committed payload
//!
//! Lets a restarted process serve the last good dataset before its first
//! network refresh completes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::MirrorError;

/// A payload read back from the mirror
#[derive(Debug, Clone)]
pub struct MirroredPayload {
    pub bytes: Bytes,
    /// File modification time, used as the snapshot's fetch time
    pub modified_at: DateTime<Utc>,
}

/// Writes and reads the raw payload of the current snapshot
#[derive(Debug, Clone)]
pub struct DatasetMirror {
    path: PathBuf,
}

impl DatasetMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the mirrored payload (temp file + rename)
    pub async fn store(&self, payload: &[u8]) -> Result<(), MirrorError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = payload.len(), "Mirrored dataset payload");
        Ok(())
    }

    /// The mirrored payload, or `None` if nothing has been mirrored yet
    pub async fn load(&self) -> Result<Option<MirroredPayload>, MirrorError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified_at = tokio::fs::metadata(&self.path)
            .await?
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(MirroredPayload { bytes, modified_at }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DatasetMirror::new(dir.path().join("dataset.csv"));
        assert!(mirror.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DatasetMirror::new(dir.path().join("nested").join("dataset.csv"));

        mirror.store(b"Match ID\n1\n").await.unwrap();
        mirror.store(b"Match ID\n2\n").await.unwrap();

        let loaded = mirror.load().await.unwrap().unwrap();
        assert_eq!(&loaded.bytes[..], b"Match ID\n2\n");
        assert!(loaded.modified_at <= Utc::now());
        assert!(!mirror.path().with_extension("tmp").exists());
    }
}
