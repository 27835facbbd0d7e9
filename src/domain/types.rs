//! Shared domain enumerations.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Kind of homepage content kept in sync across the store, the cache and snapshots.
///
/// Selects both the snapshot document and the cache-key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Hero,
    Categories,
    Sections,
    UiText,
    Campaigns,
    CategoryStats,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        ContentType::Hero,
        ContentType::Categories,
        ContentType::Sections,
        ContentType::UiText,
        ContentType::Campaigns,
        ContentType::CategoryStats,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Hero => "hero",
            ContentType::Categories => "categories",
            ContentType::Sections => "sections",
            ContentType::UiText => "ui-text",
            ContentType::Campaigns => "campaigns",
            ContentType::CategoryStats => "category-stats",
        }
    }

    /// File name of the live snapshot document.
    pub fn snapshot_file_name(self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Cache-key prefix owned by this type (`"hero:"`, `"ui-text:"`, ...).
    pub fn cache_prefix(self) -> String {
        format!("{}:", self.as_str())
    }

    /// Prefixes to delete after a successful snapshot write. The type's own
    /// prefix is always first.
    pub fn invalidation_prefixes(self) -> Vec<String> {
        match self {
            ContentType::Categories => vec![
                self.cache_prefix(),
                ContentType::CategoryStats.cache_prefix(),
            ],
            ContentType::Hero
            | ContentType::Sections
            | ContentType::UiText
            | ContentType::Campaigns
            | ContentType::CategoryStats => vec![self.cache_prefix()],
        }
    }

    /// Statically rendered paths that embed this type's content.
    pub fn revalidation_paths(self) -> &'static [&'static str] {
        match self {
            ContentType::Hero | ContentType::Sections | ContentType::CategoryStats => &["/"],
            ContentType::Categories => &["/", "/categories/[slug]"],
            ContentType::Campaigns => &["/", "/campaigns/[slug]"],
            ContentType::UiText => &["/", "/categories/[slug]", "/campaigns/[slug]"],
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| DomainError::validation(format!("unknown content type `{value}`")))
    }
}
