// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! HTTP error taxonomy (S7): maps the domain-level error kinds onto the
//! status codes and body shapes clients observe.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::application::lifecycle_service::LifecycleError;
use crate::application::mediator_service::MediateError;
use crate::domain::repository::RepositoryError;
use crate::domain::task::TaskError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_description: Option<String>,
}

/// The externally visible error surface (S7 taxonomy), minus `approval_pending`
/// which never escapes the mediator as an HTTP error — it is translated into
/// a retry loop by the runtime, not a client-facing failure.
pub enum ApiError {
    Validation(String),
    /// An OAuth protocol failure (RFC 6749 §5.2 / RFC 7591 §3.2.2): unlike
    /// `Validation`, the machine-readable `error` field carries the actual
    /// OAuth error code (`invalid_grant`, `unsupported_grant_type`, ...)
    /// rather than a fixed `invalid_request`.
    OAuth { code: &'static str, description: Option<String> },
    Unauthorized { error: String, resource_metadata: Option<String> },
    Forbidden(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn unauthorized(error: impl Into<String>, resource_metadata: Option<String>) -> Self {
        ApiError::Unauthorized { error: error.into(), resource_metadata }
    }

    pub fn oauth(code: &'static str, description: impl Into<String>) -> Self {
        ApiError::OAuth { code, description: Some(description.into()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: "invalid_request".into(), error_description: Some(msg) }))
                    .into_response()
            }
            ApiError::OAuth { code, description } => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: code.into(), error_description: description }))
                    .into_response()
            }
            ApiError::Unauthorized { error, resource_metadata } => {
                let mut headers = HeaderMap::new();
                let challenge = match resource_metadata {
                    Some(url) => format!(r#"Bearer error="{error}", resource_metadata="{url}""#),
                    None => format!(r#"Bearer error="{error}""#),
                };
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    headers.insert(axum::http::header::WWW_AUTHENTICATE, value);
                }
                (
                    StatusCode::UNAUTHORIZED,
                    headers,
                    Json(ErrorBody { error, error_description: None }),
                )
                    .into_response()
            }
            ApiError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, Json(ErrorBody { error: "forbidden".into(), error_description: Some(msg) }))
                    .into_response()
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(ErrorBody { error: "not_found".into(), error_description: Some(msg) }))
                    .into_response()
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody { error: "internal_error".into(), error_description: None }),
                )
                    .into_response()
            }
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Task(task_err) => task_err.into(),
            LifecycleError::Repository(repo_err) => repo_err.into(),
            LifecycleError::Dispatch(dispatch_err) => ApiError::Internal(dispatch_err.into()),
        }
    }
}

impl From<MediateError> for ApiError {
    fn from(e: MediateError) -> Self {
        match e {
            MediateError::Repository(repo_err) => repo_err.into(),
        }
    }
}
