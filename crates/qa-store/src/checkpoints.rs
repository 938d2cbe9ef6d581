use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use qa_core::checkpoint::Checkpoint;
use qa_core::ids::SessionId;
use qa_core::report::ChunkReport;

use crate::error::StoreError;

/// Map a raw session id onto the storage key alphabet: ASCII alphanumerics
/// and `-`, `_`, `.` are kept, every other character becomes `_`.
pub fn sanitize_session_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

/// File-backed checkpoint store, one pretty-printed JSON document per
/// session.
///
/// Writes go through a temp file in the same directory followed by a rename,
/// so readers only ever see complete documents. Every operation on a session
/// runs under that session's lock; two raw ids that sanitize to the same key
/// share both the file and the lock.
pub struct CheckpointStore {
    base_dir: PathBuf,
    ttl: Option<Duration>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CheckpointStore {
    /// `ttl_hours <= 0` disables expiry.
    pub fn new(base_dir: impl Into<PathBuf>, ttl_hours: i64) -> Self {
        Self {
            base_dir: base_dir.into(),
            ttl: Duration::try_hours(ttl_hours).filter(|_| ttl_hours > 0),
            locks: DashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Storage key for a session, or `None` when the id is blank.
    fn key_for(session_id: &SessionId) -> Option<String> {
        if session_id.is_empty() {
            return None;
        }
        Some(sanitize_session_id(session_id.as_str()))
    }

    pub fn path_for(&self, session_id: &SessionId) -> Option<PathBuf> {
        Self::key_for(session_id).map(|key| self.base_dir.join(format!("{key}.json")))
    }

    /// Take the session lock. The map entry is dropped again once the last
    /// holder or waiter lets go, so the map only holds sessions in flight.
    async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        KeyGuard {
            locks: &self.locks,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Current checkpoint for a session. Missing, corrupt and expired files
    /// all read as `None`; corrupt and expired files are removed.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn load(&self, session_id: &SessionId) -> Option<Checkpoint> {
        let key = Self::key_for(session_id)?;
        let _guard = self.acquire(&key).await;
        self.read_unlocked(&key).await
    }

    /// Replace the stored checkpoint, stamping `session_id` and `updated_at`.
    /// Returns `Ok(None)` for a blank session id.
    #[instrument(skip(self, checkpoint), fields(session_id = %session_id))]
    pub async fn save(&self, session_id: &SessionId, checkpoint: Checkpoint) -> Result<Option<Checkpoint>, StoreError> {
        let Some(key) = Self::key_for(session_id) else {
            return Ok(None);
        };
        let _guard = self.acquire(&key).await;
        self.write_unlocked(&key, session_id, checkpoint).await.map(Some)
    }

    /// Append one chunk report, creating the checkpoint on first use.
    #[instrument(skip(self, report), fields(session_id = %session_id, chunk_id = ?report.chunk_id))]
    pub async fn append_chunk(&self, session_id: &SessionId, report: ChunkReport) -> Result<Option<Checkpoint>, StoreError> {
        let Some(key) = Self::key_for(session_id) else {
            return Ok(None);
        };
        let _guard = self.acquire(&key).await;

        let mut checkpoint = self
            .read_unlocked(&key)
            .await
            .unwrap_or_else(|| Checkpoint::new(session_id.clone()));
        checkpoint.push_report(report);
        let saved = self.write_unlocked(&key, session_id, checkpoint).await?;
        debug!(chunk_count = saved.chunk_reports.len(), "chunk appended");
        Ok(Some(saved))
    }

    /// Read-modify-write an existing checkpoint. Nothing is created when the
    /// session has no live checkpoint.
    #[instrument(skip(self, apply), fields(session_id = %session_id))]
    pub async fn update<F>(&self, session_id: &SessionId, apply: F) -> Result<Option<Checkpoint>, StoreError>
    where
        F: FnOnce(&mut Checkpoint) + Send,
    {
        let Some(key) = Self::key_for(session_id) else {
            return Ok(None);
        };
        let _guard = self.acquire(&key).await;

        let Some(mut checkpoint) = self.read_unlocked(&key).await else {
            return Ok(None);
        };
        apply(&mut checkpoint);
        self.write_unlocked(&key, session_id, checkpoint).await.map(Some)
    }

    /// Delete a session's checkpoint. Returns whether a file was removed.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn clear(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let Some(key) = Self::key_for(session_id) else {
            return Ok(false);
        };
        let _guard = self.acquire(&key).await;

        match tokio::fs::remove_file(self.key_path(&key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }

    async fn read_unlocked(&self, key: &str) -> Option<Checkpoint> {
        let path = self.key_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read checkpoint");
                return None;
            }
        };

        let checkpoint: Checkpoint = match serde_json::from_str(&content) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding corrupt checkpoint");
                remove_quietly(&path).await;
                return None;
            }
        };

        if self.is_expired(&checkpoint, &path).await {
            info!(path = %path.display(), "checkpoint expired");
            remove_quietly(&path).await;
            return None;
        }
        Some(checkpoint)
    }

    async fn is_expired(&self, checkpoint: &Checkpoint, path: &Path) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let stamp = match checkpoint.updated_at {
            Some(ts) => Some(ts),
            None => modified_at(path).await,
        };
        match stamp {
            Some(ts) => Utc::now() - ts > ttl,
            None => false,
        }
    }

    async fn write_unlocked(&self, key: &str, session_id: &SessionId, mut checkpoint: Checkpoint) -> Result<Checkpoint, StoreError> {
        checkpoint.session_id = session_id.clone();
        checkpoint.updated_at = Some(Utc::now());
        let content = serde_json::to_string_pretty(&checkpoint)?;
        atomic_write(&self.base_dir, &self.key_path(key), content.as_bytes()).await?;
        Ok(checkpoint)
    }
}

async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified: SystemTime = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove checkpoint");
        }
    }
}

struct KeyGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Write to `.{name}.{uuid}.tmp` beside the target, fsync, then rename over
/// the target. The temp file is removed if any step fails.
async fn atomic_write(dir: &Path, path: &Path, content: &[u8]) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("checkpoint.json");
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::now_v7()));

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        remove_quietly(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}
