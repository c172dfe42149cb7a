/// Errors visible at the HTTP boundary and their mapping to responses.
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::dids::DidError;
use crate::jwt::JwtError;

const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Did(#[from] DidError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("no DID with a signing key is available to issue credentials")]
    NoIssuerDid,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Did(
                DidError::AlreadyExists(_)
                | DidError::InvalidDid(_)
                | DidError::UnsupportedMethod(_)
                | DidError::InvalidKey(_),
            ) => StatusCode::BAD_REQUEST,
            Self::Did(DidError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body returned by every route.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

pub fn api_error(status: StatusCode, msg: impl Into<String>, step: Option<&str>) -> Response {
    let body = ApiError {
        error: msg.into(),
        step: step.map(|s| s.to_string()),
    };
    (status, Json(body)).into_response()
}

/// An [`AgentError`] tagged with the operation that failed.
#[derive(Debug)]
pub struct RouteError {
    pub step: &'static str,
    pub source: AgentError,
}

pub trait WithStep<T> {
    fn step(self, step: &'static str) -> Result<T, RouteError>;
}

impl<T, E: Into<AgentError>> WithStep<T> for Result<T, E> {
    fn step(self, step: &'static str) -> Result<T, RouteError> {
        self.map_err(|e| RouteError {
            step,
            source: e.into(),
        })
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        if status.is_server_error() {
            tracing::error!("{} error: {}", self.step, self.source);
            api_error(status, INTERNAL_ERROR_MESSAGE, Some(self.step))
        } else {
            tracing::warn!("{} rejected: {}", self.step, self.source);
            api_error(status, self.source.to_string(), Some(self.step))
        }
    }
}
