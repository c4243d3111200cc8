//! Uniform JSON error responses and request extractors.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use poc_core::ProgressError;
use poc_indexer::storage::StorageError;
use serde::{de::DeserializeOwned, Serialize};

const ERROR_CODE_INVALID_REQUEST: &str = "invalid_request";
const ERROR_CODE_NOT_FOUND: &str = "not_found";
const ERROR_CODE_CONFLICT: &str = "conflict";
const ERROR_CODE_UPSTREAM_ERROR: &str = "upstream_error";
const ERROR_CODE_SERVICE_UNAVAILABLE: &str = "service_unavailable";
const ERROR_CODE_INTERNAL_ERROR: &str = "internal_error";

/// Error body: `{ "error": { code, message, details? } }`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: ErrorInfo,
}

#[derive(Debug, Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// Status plus JSON body returned by every failing handler.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Handler result.
pub type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorInfo {
                code,
                message: message.into(),
                details: None,
            },
        }),
    )
}

fn api_error_details(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    details: serde_json::Value,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorInfo {
                code,
                message: message.into(),
                details: Some(details),
            },
        }),
    )
}

pub(crate) fn bad_request(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, ERROR_CODE_INVALID_REQUEST, msg)
}

pub(crate) fn invalid_field(field: &'static str, msg: impl Into<String>) -> ApiError {
    api_error_details(
        StatusCode::BAD_REQUEST,
        ERROR_CODE_INVALID_REQUEST,
        msg,
        serde_json::json!({ "field": field }),
    )
}

pub(crate) fn not_found(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, ERROR_CODE_NOT_FOUND, msg)
}

pub(crate) fn conflict(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::CONFLICT, ERROR_CODE_CONFLICT, msg)
}

pub(crate) fn upstream_error<E: std::fmt::Display>(err: E) -> ApiError {
    api_error(
        StatusCode::BAD_GATEWAY,
        ERROR_CODE_UPSTREAM_ERROR,
        format!("Upstream error: {:#}", err),
    )
}

pub(crate) fn service_unavailable(msg: impl Into<String>) -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        ERROR_CODE_SERVICE_UNAVAILABLE,
        msg,
    )
}

pub(crate) fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    tracing::error!("Internal error: {:#}", err);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ERROR_CODE_INTERNAL_ERROR,
        format!("Internal error: {:#}", err),
    )
}

pub(crate) fn progress_error(err: ProgressError) -> ApiError {
    match err {
        ProgressError::ModuleNotFound(_) => not_found(err.to_string()),
        ProgressError::NoModules => bad_request(err.to_string()),
        other => conflict(other.to_string()),
    }
}

pub(crate) fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::Conflict(msg) => conflict(msg),
        StorageError::NotFound(entity) => not_found(format!("{} not found", entity)),
        StorageError::Invalid(msg) => bad_request(msg),
        StorageError::Progress(e) => progress_error(e),
        StorageError::Contended => conflict("Concurrent update retries exhausted, try again"),
        StorageError::Other(e) => internal_error(e),
    }
}

/// JSON body extractor whose rejections use [`ErrorResponse`].
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(bad_request(rejection.body_text())),
        }
    }
}

/// Query string extractor whose rejections use [`ErrorResponse`].
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(bad_request(rejection.body_text())),
        }
    }
}
