//! Showcase cache layer
//!
//! A read-through cache in front of the content repository:
//!
//! - **Backend**: any [`KvStore`]; the bundled [`MemoryStore`] is an LRU with expiry
//! - **Read-through**: [`ReadThroughCache`] fetches on miss, stores on success and
//!   degrades to pass-through when the backend is unreachable
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! namespace = "showcase"
//! campaigns_ttl_seconds = 60
//! # ... see config.rs for all options
//! ```

mod config;
mod keys;
mod lock;
mod read_through;
mod store;

pub use config::{CacheConfig, TtlPolicy, TtlTier};
pub use keys::CacheKey;
pub use read_through::{CacheOutcome, Cached, ReadThroughCache};
pub use store::{CacheBackendError, KvStore, MemoryStore};
