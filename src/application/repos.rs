//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::content::{CampaignList, CategoryStatsReport, SectionsLayout};
use crate::domain::snapshots::SnapshotDocument;
use crate::domain::types::ContentType;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("database unavailable: {0}")]
    Unavailable(String),
    #[error("database timeout")]
    Timeout,
    #[error("integrity error: {message}")]
    Integrity { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// Read access to the relational source of truth for homepage content.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn homepage_sections(&self) -> Result<SectionsLayout, RepoError>;

    /// Campaigns running right now, highest priority first.
    async fn active_campaigns(&self) -> Result<CampaignList, RepoError>;

    async fn category_stats(&self) -> Result<CategoryStatsReport, RepoError>;
}

/// Durable per-type snapshot documents.
#[async_trait]
pub trait SnapshotsRepo: Send + Sync {
    /// Current document for `content_type`, if one was ever written and is readable.
    async fn read(&self, content_type: ContentType) -> Option<SnapshotDocument>;

    /// Replace the document for `content_type`. Returns `true` only once the
    /// new document is durably in place; on `false` the previous document is untouched.
    async fn update(&self, content_type: ContentType, payload: Value) -> bool;
}
