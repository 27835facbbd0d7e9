//! Backup history retention.
//!
//! History files are named `{type}-{version}.json`; the version doubles as the
//! write time in milliseconds, so age is read from the name alone.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::{debug, warn};

use crate::domain::types::ContentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_count: usize,
    pub max_age: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct BackupEntry {
    pub version: u64,
    pub path: PathBuf,
}

pub(super) fn history_file_name(content_type: ContentType, version: u64) -> String {
    format!("{}-{version}.json", content_type.as_str())
}

/// Version encoded in a history file name, if it belongs to `content_type`.
pub(super) fn parse_version(content_type: ContentType, file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(content_type.as_str())?
        .strip_prefix('-')?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Entries to delete under `policy` given the current time in milliseconds.
///
/// The newest entry always survives, whatever its age.
pub(super) fn select_expired(
    mut entries: Vec<BackupEntry>,
    policy: RetentionPolicy,
    now_millis: u64,
) -> Vec<BackupEntry> {
    entries.sort_by(|a, b| b.version.cmp(&a.version));

    let max_age_millis = u64::try_from(policy.max_age.as_millis()).unwrap_or(u64::MAX);
    let cutoff = now_millis.saturating_sub(max_age_millis);
    let keep = policy.max_count.max(1);

    entries
        .into_iter()
        .enumerate()
        .filter(|(index, entry)| *index > 0 && (*index >= keep || entry.version < cutoff))
        .map(|(_, entry)| entry)
        .collect()
}

async fn list_entries(
    dir: &Path,
    content_type: ContentType,
) -> std::io::Result<Vec<BackupEntry>> {
    let mut entries = Vec::new();
    let mut reader = match fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(err) => return Err(err),
    };

    while let Some(entry) = reader.next_entry().await? {
        let file_name = entry.file_name();
        let Some(version) = file_name
            .to_str()
            .and_then(|name| parse_version(content_type, name))
        else {
            continue;
        };
        entries.push(BackupEntry {
            version,
            path: entry.path(),
        });
    }

    Ok(entries)
}

/// Newest history entry recorded in `dir`.
pub(super) async fn latest_entry(
    dir: &Path,
    content_type: ContentType,
) -> std::io::Result<Option<BackupEntry>> {
    let entries = list_entries(dir, content_type).await?;
    Ok(entries.into_iter().max_by_key(|entry| entry.version))
}

pub(super) async fn latest_version(
    dir: &Path,
    content_type: ContentType,
) -> std::io::Result<Option<u64>> {
    Ok(latest_entry(dir, content_type).await?.map(|entry| entry.version))
}

/// Remove history files in `dir` beyond `policy`. Returns how many were removed.
pub(super) async fn prune(
    dir: &Path,
    content_type: ContentType,
    policy: RetentionPolicy,
    now_millis: u64,
) -> std::io::Result<usize> {
    let entries = list_entries(dir, content_type).await?;
    let expired = select_expired(entries, policy, now_millis);

    let mut removed = 0;
    for entry in expired {
        match fs::remove_file(&entry.path).await {
            Ok(()) => {
                debug!(path = %entry.path.display(), version = entry.version, "Removed expired snapshot backup");
                removed += 1;
            }
            Err(err) => {
                warn!(path = %entry.path.display(), error = %err, "Failed to remove snapshot backup");
            }
        }
    }

    Ok(removed)
}
