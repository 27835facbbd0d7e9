//! Strongly-typed content payloads, one per [`ContentType`].
//!
//! Admin edits arrive as a [`ContentUpdate`] (`{"type": "hero", "data": {...}}` on the
//! wire). Just before a snapshot write the coordinator calls [`ContentUpdate::shape`],
//! a pure transform producing the JSON document stored for that type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;
use super::types::ContentType;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroSlide {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    /// Presentation attributes the sync layer does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeroContent {
    pub slides: Vec<HeroSlide>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CategoryNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryMenu {
    pub categories: Vec<CategoryNode>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionConfig {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionsLayout {
    pub sections: Vec<SectionConfig>,
    #[serde(default)]
    pub section_order: Vec<String>,
}

impl SectionsLayout {
    /// Sections sorted by `section_order`; keys missing from the order keep
    /// their relative position after the ordered ones.
    pub fn ordered(&self) -> SectionsLayout {
        let rank = |key: &str| {
            self.section_order
                .iter()
                .position(|ordered| ordered == key)
                .unwrap_or(usize::MAX)
        };

        let mut sections = self.sections.clone();
        sections.sort_by_key(|section| rank(&section.key));

        SectionsLayout {
            sections,
            section_order: self.section_order.clone(),
        }
    }
}

/// Localized UI strings for one language. Values are opaque catalog entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UiTextBundle {
    pub language: String,
    pub texts: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub starts_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CampaignList {
    pub campaigns: Vec<Campaign>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub slug: String,
    pub name: String,
    pub product_count: i64,
    pub active_campaign_count: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryStatsReport {
    pub stats: Vec<CategoryStat>,
}

/// A discrete content edit, tagged by the content type it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ContentUpdate {
    Hero(HeroContent),
    Categories(CategoryMenu),
    Sections(SectionsLayout),
    UiText(UiTextBundle),
    Campaigns(CampaignList),
    CategoryStats(CategoryStatsReport),
}

impl ContentUpdate {
    pub fn content_type(&self) -> ContentType {
        match self {
            ContentUpdate::Hero(_) => ContentType::Hero,
            ContentUpdate::Categories(_) => ContentType::Categories,
            ContentUpdate::Sections(_) => ContentType::Sections,
            ContentUpdate::UiText(_) => ContentType::UiText,
            ContentUpdate::Campaigns(_) => ContentType::Campaigns,
            ContentUpdate::CategoryStats(_) => ContentType::CategoryStats,
        }
    }

    /// Build the snapshot payload for this update. Pure: no I/O, no clock.
    pub fn shape(&self) -> Result<Value, DomainError> {
        let content_type = self.content_type();
        let shaped = match self {
            ContentUpdate::Hero(hero) => serde_json::to_value(hero),
            ContentUpdate::Categories(menu) => serde_json::to_value(menu),
            ContentUpdate::Sections(layout) => serde_json::to_value(layout.ordered()),
            ContentUpdate::UiText(bundle) => {
                if bundle.language.trim().is_empty() {
                    return Err(DomainError::validation("ui-text language must not be empty"));
                }
                serde_json::to_value(bundle)
            }
            ContentUpdate::Campaigns(list) => {
                let mut campaigns = list.campaigns.clone();
                campaigns.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then_with(|| a.slug.cmp(&b.slug))
                });
                serde_json::to_value(CampaignList { campaigns })
            }
            ContentUpdate::CategoryStats(report) => {
                let mut stats = report.stats.clone();
                stats.sort_by(|a, b| a.slug.cmp(&b.slug));
                serde_json::to_value(CategoryStatsReport { stats })
            }
        };

        shaped.map_err(|err| DomainError::payload(content_type, err))
    }
}
