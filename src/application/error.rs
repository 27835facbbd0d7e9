use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{domain::error::DomainError, infra::error::InfraError, sync::SyncError};

/// Error body returned to HTTP clients, with the source chain for operators.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub error: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(public_message: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            error: public_message,
            messages,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(_) => StatusCode::BAD_REQUEST,
            AppError::Sync(SyncError::Shape(_)) => StatusCode::BAD_REQUEST,
            AppError::Sync(SyncError::Stopped) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(_) | AppError::Sync(SyncError::Shape(_)) => {
                "Request could not be processed"
            }
            AppError::Sync(SyncError::Stopped) => "Sync coordinator is shutting down",
            AppError::Infra(InfraError::Database { .. }) => "Service temporarily unavailable",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Infra(InfraError::Snapshot(_)) => "Snapshot storage unavailable",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let report = ErrorReport::from_error(self.presentation_message(), &self);
        (status, Json(report)).into_response()
    }
}
