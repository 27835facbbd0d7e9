//! HTTP egress for page revalidation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::debug;

use crate::application::revalidate::{PageRevalidator, RevalidateError};

use super::error::InfraError;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct RevalidateConfig {
    pub url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl RevalidateConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Serialize)]
struct RevalidateRequest<'a> {
    paths: &'a [String],
}

/// Posts `{"paths": [...]}` to the configured endpoint.
#[derive(Debug, Clone)]
pub struct HttpRevalidator {
    client: Client,
    config: RevalidateConfig,
}

impl HttpRevalidator {
    pub fn new(config: RevalidateConfig) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("showcase/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build revalidation client: {err}"))
            })?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PageRevalidator for HttpRevalidator {
    async fn revalidate(&self, paths: &[String]) -> Result<(), RevalidateError> {
        let mut request = self
            .client
            .post(self.config.url.clone())
            .json(&RevalidateRequest { paths });
        if let Some(token) = self.config.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RevalidateError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RevalidateError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(status = status.as_u16(), count = paths.len(), "Revalidation accepted");
        Ok(())
    }
}
