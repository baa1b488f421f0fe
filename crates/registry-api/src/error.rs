//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Error handling for the registry API
//!
//! Every error is rendered as the JSON error body
//! `{"error": <status text>, "message": <human>, "code": <int>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::provider::ProviderError;
use crate::responses::ErrorResponse;

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Registry API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request is malformed, e.g. an unsupported format value
    #[error("{0}")]
    BadRequest(String),

    /// A specifically named entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// A downstream dependency failed
    #[error("{0}")]
    Internal(String),

    /// The service cannot serve requests yet
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            // 404 is reserved for missing named entities; a missing registry
            // or storage artifact is a downstream failure.
            ProviderError::RegistryNotFound(msg) | ProviderError::StorageNotFound(msg) => {
                Self::Internal(msg)
            }
            ProviderError::Unavailable(msg) => Self::Internal(msg),
        }
    }
}

impl From<registry_core::RegistryError> for ApiError {
    fn from(err: registry_core::RegistryError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: self.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
