use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use time::OffsetDateTime;

use super::content::{
    CampaignList, CategoryMenu, CategoryStatsReport, ContentUpdate, HeroContent, SectionsLayout,
    UiTextBundle,
};
use super::error::DomainError;
use super::types::ContentType;

/// Versioned JSON document holding the current state of one content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub version: u64,
    pub payload: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl SnapshotDocument {
    /// Build the successor of `previous` carrying `payload`.
    ///
    /// Versions derive from the wall clock in milliseconds but never go
    /// backwards: a clock step or two writes in the same millisecond still
    /// yield a strictly greater version.
    pub fn next(
        content_type: ContentType,
        previous: Option<u64>,
        payload: Value,
        now: OffsetDateTime,
    ) -> Self {
        let millis = u64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(0);
        let version = match previous {
            Some(previous) => millis.max(previous.saturating_add(1)),
            None => millis.max(1),
        };

        Self {
            content_type,
            version,
            payload,
            last_updated: now,
        }
    }
}

/// Binds a typed payload to the snapshot document of its content type.
pub trait Snapshotable: Serialize + DeserializeOwned {
    const CONTENT_TYPE: ContentType;

    /// Wrap the payload as an update for the sync coordinator.
    fn into_update(self) -> ContentUpdate;

    /// Decode the payload stored in a snapshot document.
    fn from_snapshot(document: &SnapshotDocument) -> Result<Self, DomainError> {
        if document.content_type != Self::CONTENT_TYPE {
            return Err(DomainError::TypeMismatch {
                expected: Self::CONTENT_TYPE,
                found: document.content_type,
            });
        }

        serde_json::from_value(document.payload.clone())
            .map_err(|err| DomainError::payload(Self::CONTENT_TYPE, err))
    }
}

impl Snapshotable for HeroContent {
    const CONTENT_TYPE: ContentType = ContentType::Hero;

    fn into_update(self) -> ContentUpdate {
        ContentUpdate::Hero(self)
    }
}

impl Snapshotable for CategoryMenu {
    const CONTENT_TYPE: ContentType = ContentType::Categories;

    fn into_update(self) -> ContentUpdate {
        ContentUpdate::Categories(self)
    }
}

impl Snapshotable for SectionsLayout {
    const CONTENT_TYPE: ContentType = ContentType::Sections;

    fn into_update(self) -> ContentUpdate {
        ContentUpdate::Sections(self)
    }
}

impl Snapshotable for UiTextBundle {
    const CONTENT_TYPE: ContentType = ContentType::UiText;

    fn into_update(self) -> ContentUpdate {
        ContentUpdate::UiText(self)
    }
}

impl Snapshotable for CampaignList {
    const CONTENT_TYPE: ContentType = ContentType::Campaigns;

    fn into_update(self) -> ContentUpdate {
        ContentUpdate::Campaigns(self)
    }
}

impl Snapshotable for CategoryStatsReport {
    const CONTENT_TYPE: ContentType = ContentType::CategoryStats;

    fn into_update(self) -> ContentUpdate {
        ContentUpdate::CategoryStats(self)
    }
}
