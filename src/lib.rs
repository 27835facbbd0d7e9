//! Homepage content caching and sync layer for a marketplace storefront.
//!
//! Reads go through a namespaced read-through cache backed by the database, with
//! versioned on-disk snapshots as the last fallback. Content edits are debounced,
//! coalesced per content type and published as snapshots by a single worker.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod sync;
