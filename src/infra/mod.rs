//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod http;
pub mod revalidate;
pub mod snapshots;
pub mod telemetry;
