//! Homepage preload aggregation.
//!
//! Sections, campaigns and category statistics are resolved concurrently and
//! independently. Each one walks the same chain: cache, then repository, then
//! the last snapshot written for its type.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::application::repos::{ContentRepo, RepoError, SnapshotsRepo};
use crate::cache::{CacheKey, ReadThroughCache, TtlPolicy};
use crate::domain::content::{Campaign, CategoryStat, SectionConfig};
use crate::domain::snapshots::Snapshotable;

const METRIC_PRELOAD_MS: &str = "showcase_preload_ms";
const METRIC_PRELOAD_FALLBACK: &str = "showcase_preload_fallback_total";

/// Tier that produced a value. Ordered from freshest path to last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Cache,
    Database,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PreloadResource {
    Sections,
    Campaigns,
    CategoryStats,
}

impl PreloadResource {
    pub fn as_str(self) -> &'static str {
        match self {
            PreloadResource::Sections => "sections",
            PreloadResource::Campaigns => "campaigns",
            PreloadResource::CategoryStats => "category-stats",
        }
    }
}

impl fmt::Display for PreloadResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier used per resource; `None` when every tier failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSources {
    pub sections: Option<DataSource>,
    pub campaigns: Option<DataSource>,
    pub category_stats: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadMetadata {
    /// Every resource was served from the cache.
    pub cached: bool,
    /// Worst tier actually used.
    pub source: DataSource,
    pub load_time_ms: u64,
    pub sources: ResourceSources,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<PreloadResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadResult {
    /// Enabled sections in display order.
    pub sections: Vec<SectionConfig>,
    pub campaigns: Vec<Campaign>,
    pub category_stats: Vec<CategoryStat>,
    pub metadata: PreloadMetadata,
}

#[derive(Debug, Error)]
pub enum PreloadError {
    /// Cache, repository and snapshot all failed for `resources`. `partial`
    /// holds the remaining resources with defaults in place of the missing ones.
    #[error("no source could provide {resources:?}")]
    Unavailable {
        resources: Vec<PreloadResource>,
        partial: Box<PreloadResult>,
    },
}

impl PreloadError {
    pub fn partial(&self) -> &PreloadResult {
        match self {
            PreloadError::Unavailable { partial, .. } => partial,
        }
    }

    pub fn into_partial(self) -> PreloadResult {
        match self {
            PreloadError::Unavailable { partial, .. } => *partial,
        }
    }
}

struct Resolved<T> {
    value: Option<T>,
    source: Option<DataSource>,
}

impl<T: Default> Resolved<T> {
    fn unavailable() -> Self {
        Self {
            value: None,
            source: None,
        }
    }

    fn into_parts(self) -> (T, Option<DataSource>) {
        (self.value.unwrap_or_default(), self.source)
    }
}

pub struct PreloadAggregator {
    repo: Arc<dyn ContentRepo>,
    snapshots: Arc<dyn SnapshotsRepo>,
    cache: Arc<ReadThroughCache>,
    ttl: TtlPolicy,
}

impl PreloadAggregator {
    pub fn new(
        repo: Arc<dyn ContentRepo>,
        snapshots: Arc<dyn SnapshotsRepo>,
        cache: Arc<ReadThroughCache>,
        ttl: TtlPolicy,
    ) -> Self {
        Self {
            repo,
            snapshots,
            cache,
            ttl,
        }
    }

    /// Assemble the homepage payload. Read-only: never writes snapshots.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<PreloadResult, PreloadError> {
        let start = Instant::now();
        let repo = &self.repo;

        let (sections, campaigns, category_stats) = tokio::join!(
            self.resolve(PreloadResource::Sections, CacheKey::HomepageSections, || {
                repo.homepage_sections()
            }),
            self.resolve(PreloadResource::Campaigns, CacheKey::ActiveCampaigns, || {
                repo.active_campaigns()
            }),
            self.resolve(PreloadResource::CategoryStats, CacheKey::CategoryStats, || {
                repo.category_stats()
            }),
        );

        let (sections, sections_source) = sections.into_parts();
        let (campaigns, campaigns_source) = campaigns.into_parts();
        let (category_stats, category_stats_source) = category_stats.into_parts();
        let sources = ResourceSources {
            sections: sections_source,
            campaigns: campaigns_source,
            category_stats: category_stats_source,
        };

        let unavailable: Vec<PreloadResource> = [
            (PreloadResource::Sections, sources.sections),
            (PreloadResource::Campaigns, sources.campaigns),
            (PreloadResource::CategoryStats, sources.category_stats),
        ]
        .into_iter()
        .filter(|(_, source)| source.is_none())
        .map(|(resource, _)| resource)
        .collect();

        let used = [sources.sections, sources.campaigns, sources.category_stats];
        let cached = used.iter().all(|source| *source == Some(DataSource::Cache));
        let source = used
            .iter()
            .flatten()
            .copied()
            .max()
            .unwrap_or(DataSource::Snapshot);

        let elapsed = start.elapsed();
        histogram!(METRIC_PRELOAD_MS).record(elapsed.as_secs_f64() * 1000.0);

        let result = PreloadResult {
            sections: sections
                .ordered()
                .sections
                .into_iter()
                .filter(|section| section.enabled)
                .collect(),
            campaigns: campaigns.campaigns,
            category_stats: category_stats.stats,
            metadata: PreloadMetadata {
                cached,
                source,
                load_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                sources,
                unavailable: unavailable.clone(),
            },
        };

        debug!(
            cached,
            source = ?source,
            load_time_ms = result.metadata.load_time_ms,
            "Homepage preload assembled"
        );

        if unavailable.is_empty() {
            Ok(result)
        } else {
            Err(PreloadError::Unavailable {
                resources: unavailable,
                partial: Box::new(result),
            })
        }
    }

    async fn resolve<T, F, Fut>(
        &self,
        resource: PreloadResource,
        key: CacheKey,
        fetch: F,
    ) -> Resolved<T>
    where
        T: Snapshotable + Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        let ttl = self.ttl.for_content(T::CONTENT_TYPE);
        let error = match self.cache.fetch_through(&key.to_string(), ttl, fetch).await {
            Ok(cached) => {
                let source = if cached.is_hit() {
                    DataSource::Cache
                } else {
                    DataSource::Database
                };
                return Resolved {
                    value: Some(cached.value),
                    source: Some(source),
                };
            }
            Err(err) => err,
        };

        warn!(
            resource = %resource,
            error = %error,
            tier = "database",
            "Repository fetch failed; falling back to snapshot"
        );
        counter!(METRIC_PRELOAD_FALLBACK, "resource" => resource.as_str(), "tier" => "snapshot")
            .increment(1);

        let Some(document) = self.snapshots.read(T::CONTENT_TYPE).await else {
            warn!(resource = %resource, tier = "snapshot", "No snapshot available");
            counter!(METRIC_PRELOAD_FALLBACK, "resource" => resource.as_str(), "tier" => "unavailable")
                .increment(1);
            return Resolved::unavailable();
        };

        match T::from_snapshot(&document) {
            Ok(value) => Resolved {
                value: Some(value),
                source: Some(DataSource::Snapshot),
            },
            Err(err) => {
                warn!(resource = %resource, tier = "snapshot", error = %err, "Snapshot payload unusable");
                counter!(METRIC_PRELOAD_FALLBACK, "resource" => resource.as_str(), "tier" => "unavailable")
                    .increment(1);
                Resolved::unavailable()
            }
        }
    }
}
