//! File-backed snapshot documents.
//!
//! Layout under the base directory:
//!
//! - `{type}.json`: the live document, replaced by rename
//! - `{type}.json.backup`: the document the live one replaced
//! - `backups/{type}/{type}-{version}.json`: write history, pruned by retention

mod retention;

pub use retention::RetentionPolicy;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::SnapshotsRepo;
use crate::domain::snapshots::SnapshotDocument;
use crate::domain::types::ContentType;

const METRIC_SNAPSHOT_WRITE: &str = "showcase_snapshot_write_total";
const BACKUP_DIR: &str = "backups";
const DEFAULT_BACKUP_MAX_COUNT: usize = 20;
const DEFAULT_BACKUP_MAX_AGE_DAYS: u64 = 7;
/// Age after which a temp file from another process counts as abandoned.
const ORPHANED_TEMP_GRACE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io failed at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot at `{}` is not a valid document: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot at `{}` holds `{found}` instead of `{expected}`", path.display())]
    WrongType {
        path: PathBuf,
        expected: ContentType,
        found: ContentType,
    },
    #[error("failed to encode {content_type} snapshot: {source}")]
    Encode {
        content_type: ContentType,
        #[source]
        source: serde_json::Error,
    },
}

impl SnapshotError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStoreConfig {
    pub directory: PathBuf,
    pub retention: RetentionPolicy,
}

impl SnapshotStoreConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            retention: RetentionPolicy {
                max_count: DEFAULT_BACKUP_MAX_COUNT,
                max_age: Duration::from_secs(DEFAULT_BACKUP_MAX_AGE_DAYS * 24 * 60 * 60),
            },
        }
    }
}

impl From<&crate::config::SnapshotSettings> for SnapshotStoreConfig {
    fn from(settings: &crate::config::SnapshotSettings) -> Self {
        Self {
            directory: settings.directory.clone(),
            retention: RetentionPolicy {
                max_count: settings.backup_max_count.get() as usize,
                max_age: settings.backup_max_age,
            },
        }
    }
}

/// Read-only report used by health checks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatus {
    pub base_path: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub documents: Vec<DocumentStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatus {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub version: Option<u64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}

pub struct SnapshotStore {
    config: SnapshotStoreConfig,
    /// Serializes writers per content type, indexed by discriminant.
    locks: [Mutex<()>; ContentType::ALL.len()],
}

impl SnapshotStore {
    /// Open the store, creating the directory layout and clearing temp files
    /// left behind by interrupted writes.
    pub async fn open(config: SnapshotStoreConfig) -> Result<Self, SnapshotError> {
        let backups = config.directory.join(BACKUP_DIR);
        fs::create_dir_all(&backups)
            .await
            .map_err(|err| SnapshotError::io(&backups, err))?;

        let store = Self {
            config,
            locks: std::array::from_fn(|_| Mutex::new(())),
        };
        store.remove_orphaned_temp_files().await;

        info!(
            base_path = %store.config.directory.display(),
            backup_max_count = store.config.retention.max_count,
            backup_max_age_secs = store.config.retention.max_age.as_secs(),
            "Snapshot store ready"
        );
        Ok(store)
    }

    pub fn base_path(&self) -> &Path {
        &self.config.directory
    }

    pub fn live_path(&self, content_type: ContentType) -> PathBuf {
        self.config.directory.join(content_type.snapshot_file_name())
    }

    pub fn backup_path(&self, content_type: ContentType) -> PathBuf {
        self.config
            .directory
            .join(format!("{}.backup", content_type.snapshot_file_name()))
    }

    pub fn history_dir(&self, content_type: ContentType) -> PathBuf {
        self.config
            .directory
            .join(BACKUP_DIR)
            .join(content_type.as_str())
    }

    /// Temp file a write for `content_type` from this process goes through.
    pub fn temp_path(&self, content_type: ContentType) -> PathBuf {
        self.config.directory.join(format!(
            "{}.{}.tmp",
            content_type.snapshot_file_name(),
            std::process::id()
        ))
    }

    /// Current document. An unreadable live file falls back to the newest
    /// history entry, then to the `.backup` copy.
    pub async fn load(&self, content_type: ContentType) -> Option<SnapshotDocument> {
        match read_document(&self.live_path(content_type), content_type).await {
            Ok(Some((document, _))) => return Some(document),
            Ok(None) => return None,
            Err(err) => {
                warn!(content_type = %content_type, error = %err, "Live snapshot unreadable; trying history");
            }
        }

        match retention::latest_entry(&self.history_dir(content_type), content_type).await {
            Ok(Some(entry)) => match read_document(&entry.path, content_type).await {
                Ok(Some((document, _))) => return Some(document),
                Ok(None) => {}
                Err(err) => {
                    warn!(content_type = %content_type, error = %err, "Newest snapshot history entry unreadable");
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(content_type = %content_type, error = %err, "Failed to scan snapshot history");
            }
        }

        match read_document(&self.backup_path(content_type), content_type).await {
            Ok(found) => found.map(|(document, _)| document),
            Err(err) => {
                warn!(content_type = %content_type, error = %err, "Snapshot backup unreadable");
                None
            }
        }
    }

    /// Write a new version of `content_type`, returning the document now live.
    #[instrument(skip(self, payload))]
    pub async fn try_update(
        &self,
        content_type: ContentType,
        payload: Value,
    ) -> Result<SnapshotDocument, SnapshotError> {
        let _guard = self.locks[content_type as usize].lock().await;

        let live = self.live_path(content_type);
        let previous = match read_document(&live, content_type).await {
            Ok(previous) => previous,
            Err(err) => {
                warn!(error = %err, "Replacing unreadable live snapshot");
                None
            }
        };
        let previous_version = match &previous {
            Some((document, _)) => Some(document.version),
            None => self.recover_version(content_type).await,
        };

        let document = SnapshotDocument::next(
            content_type,
            previous_version,
            payload,
            OffsetDateTime::now_utc(),
        );
        let bytes = serde_json::to_vec_pretty(&document).map_err(|source| SnapshotError::Encode {
            content_type,
            source,
        })?;

        atomic_write(&self.temp_path(content_type), &live, &bytes).await?;

        if let Some((_, previous_bytes)) = previous {
            let backup = self.backup_path(content_type);
            let temp = self.config.directory.join(format!(
                "{}.backup.{}.tmp",
                content_type.snapshot_file_name(),
                std::process::id()
            ));
            if let Err(err) = atomic_write(&temp, &backup, &previous_bytes).await {
                warn!(error = %err, "Failed to refresh snapshot backup copy");
            }
        }
        self.record_history(content_type, &document, &bytes).await;

        Ok(document)
    }

    /// Highest version known without a readable live document: the backup copy or history.
    async fn recover_version(&self, content_type: ContentType) -> Option<u64> {
        let backup = self.load(content_type).await.map(|document| document.version);
        let history = retention::latest_version(&self.history_dir(content_type), content_type)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to scan snapshot history");
                None
            });
        backup.max(history)
    }

    pub async fn status(&self) -> SnapshotStatus {
        let documents = join_all(ContentType::ALL.into_iter().map(|content_type| async move {
            let document = self.load(content_type).await;
            DocumentStatus {
                content_type,
                version: document.as_ref().map(|document| document.version),
                last_updated: document.map(|document| document.last_updated),
            }
        }))
        .await;

        SnapshotStatus {
            base_path: self.config.directory.clone(),
            timestamp: OffsetDateTime::now_utc(),
            documents,
        }
    }

    async fn record_history(&self, content_type: ContentType, document: &SnapshotDocument, bytes: &[u8]) {
        let dir = self.history_dir(content_type);
        if let Err(err) = fs::create_dir_all(&dir).await {
            warn!(path = %dir.display(), error = %err, "Failed to create snapshot history directory");
            return;
        }

        let path = dir.join(retention::history_file_name(content_type, document.version));
        if let Err(err) = fs::write(&path, bytes).await {
            warn!(path = %path.display(), error = %err, "Failed to write snapshot history entry");
            return;
        }

        match retention::prune(&dir, content_type, self.config.retention, document.version).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Pruned snapshot history"),
            Err(err) => warn!(path = %dir.display(), error = %err, "Failed to prune snapshot history"),
        }
    }

    /// Remove temp files this process owns, plus any temp file untouched for
    /// longer than [`ORPHANED_TEMP_GRACE`]. Peers sharing the directory keep
    /// their in-flight writes.
    async fn remove_orphaned_temp_files(&self) {
        let dir = &self.config.directory;
        let mut reader = match fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "Failed to scan snapshot directory");
                return;
            }
        };

        let own_pid = std::process::id();
        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "Failed to scan snapshot directory");
                    break;
                }
            };

            let path = entry.path();
            let Some(pid) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(temp_file_owner)
            else {
                continue;
            };
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let stale = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .is_some_and(|age| age >= ORPHANED_TEMP_GRACE);
            if pid != Some(own_pid) && !stale {
                debug!(path = %path.display(), "Keeping temp file owned by another process");
                continue;
            }

            debug!(path = %path.display(), "Removing orphaned temp file");
            if let Err(err) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %err, "Failed to remove temp file");
            }
        }
    }
}

/// Owner of a temp file named `{file}.{pid}.tmp`.
///
/// `None` when the name is not a temp file at all, `Some(None)` when it is
/// one without a readable pid.
fn temp_file_owner(file_name: &str) -> Option<Option<u32>> {
    let stem = file_name.strip_suffix(".tmp")?;
    Some(
        stem.rsplit_once('.')
            .and_then(|(_, pid)| pid.parse().ok()),
    )
}

#[async_trait]
impl SnapshotsRepo for SnapshotStore {
    async fn read(&self, content_type: ContentType) -> Option<SnapshotDocument> {
        self.load(content_type).await
    }

    async fn update(&self, content_type: ContentType, payload: Value) -> bool {
        match self.try_update(content_type, payload).await {
            Ok(document) => {
                counter!(METRIC_SNAPSHOT_WRITE, "result" => "ok").increment(1);
                info!(
                    content_type = %content_type,
                    version = document.version,
                    "Snapshot updated"
                );
                true
            }
            Err(err) => {
                counter!(METRIC_SNAPSHOT_WRITE, "result" => "error").increment(1);
                warn!(content_type = %content_type, error = %err, "Snapshot update failed; previous document kept");
                false
            }
        }
    }
}

/// Decoded document at `path` plus its raw bytes, `None` when the file does not exist.
async fn read_document(
    path: &Path,
    content_type: ContentType,
) -> Result<Option<(SnapshotDocument, Vec<u8>)>, SnapshotError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(SnapshotError::io(path, err)),
    };

    let document: SnapshotDocument =
        serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    if document.content_type != content_type {
        return Err(SnapshotError::WrongType {
            path: path.to_path_buf(),
            expected: content_type,
            found: document.content_type,
        });
    }

    Ok(Some((document, bytes)))
}

/// Write `bytes` to `temp`, flush it to disk, then rename over `target`.
async fn atomic_write(temp: &Path, target: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let result = write_synced(temp, bytes).await;
    let result = match result {
        Ok(()) => fs::rename(temp, target)
            .await
            .map_err(|err| SnapshotError::io(target, err)),
        Err(err) => Err(err),
    };

    if result.is_err() {
        let _ = fs::remove_file(temp).await;
    }
    result
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|err| SnapshotError::io(path, err))?;
    file.write_all(bytes)
        .await
        .map_err(|err| SnapshotError::io(path, err))?;
    file.sync_all()
        .await
        .map_err(|err| SnapshotError::io(path, err))
}
