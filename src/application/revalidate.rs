//! Page revalidation port.
//!
//! After a flush batch writes at least one snapshot, statically rendered pages
//! embedding that content must be regenerated.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RevalidateError {
    #[error("revalidation request failed: {0}")]
    Transport(String),
    #[error("revalidation rejected with status {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait PageRevalidator: Send + Sync {
    async fn revalidate(&self, paths: &[String]) -> Result<(), RevalidateError>;
}

/// Used when no revalidation endpoint is configured; only logs the paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRevalidator;

#[async_trait]
impl PageRevalidator for NoopRevalidator {
    async fn revalidate(&self, paths: &[String]) -> Result<(), RevalidateError> {
        info!(?paths, "Revalidation endpoint not configured; skipping");
        Ok(())
    }
}
