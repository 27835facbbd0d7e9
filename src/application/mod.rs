//! Application services layer: ports and the homepage aggregator.

pub mod error;
pub mod preload;
pub mod repos;
pub mod revalidate;
