use std::time::Duration;

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::IntoResponse,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::TransitionError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend failed or returned a corrupted record.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Bearer credential did not resolve to a participant.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Missing or malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation is not legal in the entity's current phase.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Caller is known but may not perform this action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Caller exhausted its request budget.
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited {
        /// Time until the caller's window resets.
        retry_after: Duration,
    },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        let message = err.to_string();
        match err {
            TransitionError::SelfJoin => ServiceError::InvalidInput(message),
            TransitionError::NotYourTurn { .. } | TransitionError::NotASide => {
                ServiceError::Forbidden(message)
            }
            TransitionError::NotOpen { .. }
            | TransitionError::NotInProgress { .. }
            | TransitionError::NotScoring { .. }
            | TransitionError::AlreadyConcluded { .. } => ServiceError::InvalidState(message),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("{0}")]
    BadRequest(String),
    /// Unknown credential.
    #[error("{0}")]
    Unauthorized(String),
    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("{0}")]
    Conflict(String),
    /// Throttled request.
    #[error("rate limit exceeded")]
    TooManyRequests {
        /// Seconds until the caller may retry.
        retry_after_secs: u64,
    },
    /// Service unavailable or degraded.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source @ StorageError::Corrupted { .. }) => {
                AppError::Internal(source.to_string())
            }
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::RateLimited { retry_after } => AppError::TooManyRequests {
                retry_after_secs: retry_after.as_secs().max(1),
            },
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Error payload returned by every failing endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Taxonomy kind: `invalid_input`, `unauthorized`, `forbidden`, `not_found`,
    /// `invalid_state`, `rate_limited`, `unavailable` or `internal`.
    pub kind: &'static str,
    /// Human readable explanation.
    pub message: String,
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "invalid_state"),
            AppError::TooManyRequests { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind) = self.status_and_kind();
        let payload = Json(ErrorBody {
            kind,
            message: self.to_string(),
        });

        let mut response = (status, payload).into_response();
        if let AppError::TooManyRequests { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{DialoguePhase, Side};

    #[test]
    fn transition_errors_map_onto_taxonomy() {
        assert!(matches!(
            ServiceError::from(TransitionError::SelfJoin),
            ServiceError::InvalidInput(_)
        ));
        assert!(matches!(
            ServiceError::from(TransitionError::NotYourTurn {
                index: 1,
                side: Side::Respondent
            }),
            ServiceError::Forbidden(_)
        ));
        assert!(matches!(
            ServiceError::from(TransitionError::NotOpen {
                phase: DialoguePhase::InProgress
            }),
            ServiceError::InvalidState(_)
        ));
        assert!(matches!(
            ServiceError::from(TransitionError::AlreadyConcluded {
                side: Side::Challenger
            }),
            ServiceError::InvalidState(_)
        ));
    }

    #[test]
    fn corrupted_records_are_internal_errors() {
        let response = AppError::from(ServiceError::from(StorageError::corrupted(
            "d-1",
            "malformed identifier",
        )))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = AppError::from(ServiceError::RateLimited {
            retry_after: Duration::from_secs(12),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "12");
    }

    #[test]
    fn taxonomy_kinds_reach_the_status_line() {
        let cases = [
            (ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::InvalidState("x".into()), StatusCode::CONFLICT),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
