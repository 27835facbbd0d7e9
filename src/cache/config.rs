//! Cache configuration.
//!
//! Controls the read-through cache and its TTL tiers via `showcase.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::domain::types::ContentType;

const DEFAULT_NAMESPACE: &str = "showcase";
const DEFAULT_CAPACITY: usize = 1024;
const DEFAULT_CAMPAIGNS_TTL_SECS: u64 = 60;
const DEFAULT_CATEGORY_STATS_TTL_SECS: u64 = 300;
const DEFAULT_CONTENT_TTL_SECS: u64 = 900;
const DEFAULT_UI_CONFIG_TTL_SECS: u64 = 3600;

/// Resolved cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every lookup misses and nothing is stored.
    pub enabled: bool,
    /// Prepended to every key so several deployments can share one backend.
    pub namespace: String,
    /// Maximum entries held by the in-process backend.
    pub capacity: usize,
    pub ttl: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            capacity: DEFAULT_CAPACITY,
            ttl: TtlPolicy::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            namespace: settings.namespace.clone(),
            capacity: settings.capacity.get(),
            ttl: TtlPolicy {
                volatile: settings.campaigns_ttl,
                frequent: settings.category_stats_ttl,
                standard: settings.content_ttl,
                stable: settings.ui_config_ttl,
            },
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

/// Volatility class of cached data; picks the TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlTier {
    /// Campaign listings.
    Volatile,
    /// Derived statistics.
    Frequent,
    /// Editorial content: hero, menus, section layout.
    Standard,
    /// UI configuration and localized text.
    Stable,
}

impl TtlTier {
    pub fn for_content(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Campaigns => TtlTier::Volatile,
            ContentType::CategoryStats => TtlTier::Frequent,
            ContentType::Hero | ContentType::Categories | ContentType::Sections => {
                TtlTier::Standard
            }
            ContentType::UiText => TtlTier::Stable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub volatile: Duration,
    pub frequent: Duration,
    pub standard: Duration,
    pub stable: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            volatile: Duration::from_secs(DEFAULT_CAMPAIGNS_TTL_SECS),
            frequent: Duration::from_secs(DEFAULT_CATEGORY_STATS_TTL_SECS),
            standard: Duration::from_secs(DEFAULT_CONTENT_TTL_SECS),
            stable: Duration::from_secs(DEFAULT_UI_CONFIG_TTL_SECS),
        }
    }
}

impl TtlPolicy {
    pub fn ttl(&self, tier: TtlTier) -> Duration {
        match tier {
            TtlTier::Volatile => self.volatile,
            TtlTier::Frequent => self.frequent,
            TtlTier::Standard => self.standard,
            TtlTier::Stable => self.stable,
        }
    }

    pub fn for_content(&self, content_type: ContentType) -> Duration {
        self.ttl(TtlTier::for_content(content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.namespace, "showcase");
        assert_eq!(config.capacity, 1024);
        assert_eq!(config.ttl.volatile, Duration::from_secs(60));
        assert_eq!(config.ttl.stable, Duration::from_secs(3600));
    }

    #[test]
    fn campaigns_expire_first_ui_text_last() {
        let policy = TtlPolicy::default();
        let campaigns = policy.for_content(ContentType::Campaigns);
        for content_type in ContentType::ALL {
            let ttl = policy.for_content(content_type);
            assert!(campaigns <= ttl);
            assert!(ttl <= policy.for_content(ContentType::UiText));
        }
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
