//! Cache key definitions.
//!
//! Every key starts with the prefix of the content type it depends on, so a
//! prefix delete after a snapshot write reaches all of them.

use std::fmt;

use crate::domain::types::ContentType;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Homepage section layout.
    HomepageSections,
    /// Currently running campaigns.
    ActiveCampaigns,
    /// Per-category product and campaign counts.
    CategoryStats,
}

impl CacheKey {
    pub fn content_type(&self) -> ContentType {
        match self {
            CacheKey::HomepageSections => ContentType::Sections,
            CacheKey::ActiveCampaigns => ContentType::Campaigns,
            CacheKey::CategoryStats => ContentType::CategoryStats,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.content_type().cache_prefix();
        match self {
            CacheKey::HomepageSections => write!(f, "{prefix}homepage"),
            CacheKey::ActiveCampaigns => write!(f, "{prefix}active"),
            CacheKey::CategoryStats => write!(f, "{prefix}all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_their_type_prefix() {
        assert_eq!(CacheKey::HomepageSections.to_string(), "sections:homepage");
        assert_eq!(CacheKey::ActiveCampaigns.to_string(), "campaigns:active");
        assert_eq!(CacheKey::CategoryStats.to_string(), "category-stats:all");
    }

    #[test]
    fn every_key_is_reached_by_its_type_invalidation() {
        for key in [
            CacheKey::HomepageSections,
            CacheKey::ActiveCampaigns,
            CacheKey::CategoryStats,
        ] {
            let rendered = key.to_string();
            assert!(
                key.content_type()
                    .invalidation_prefixes()
                    .iter()
                    .any(|prefix| rendered.starts_with(prefix.as_str())),
                "{rendered} escapes invalidation"
            );
        }
    }
}
