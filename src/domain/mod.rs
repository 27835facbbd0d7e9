//! Domain layer types and invariants.

pub mod content;
pub mod error;
pub mod snapshots;
pub mod types;
