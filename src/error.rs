use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::domain::approval::ApprovalError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The conditional update matched no row: someone else decided first.
    #[error("request was changed by someone else, reload it and try again")]
    Conflict,

    #[error("stored record is invalid: {0}")]
    Corrupt(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Approval(e) => match e {
                ApprovalError::AlreadyFinalized
                | ApprovalError::WrongLevel { .. }
                | ApprovalError::ApprovalStarted => StatusCode::CONFLICT,
                ApprovalError::InvalidApprover { .. } | ApprovalError::NotRequester => {
                    StatusCode::FORBIDDEN
                }
                ApprovalError::EmptyChain => StatusCode::UNPROCESSABLE_ENTITY,
                ApprovalError::Inconsistent(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Corrupt(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let message = if status.is_server_error() {
            match self {
                ApiError::Database(e) => tracing::error!(error = %e, "Database error"),
                ApiError::Internal(e) => tracing::error!(error = ?e, "Internal error"),
                other => tracing::error!(error = %other, "Server error"),
            }
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(json!({ "message": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_of(err: ApiError) -> serde_json::Value {
        let bytes = to_bytes(err.error_response().into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn approval_errors_map_to_client_statuses() {
        assert_eq!(
            ApiError::from(ApprovalError::AlreadyFinalized).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ApprovalError::WrongLevel {
                expected: 2,
                got: 1
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ApprovalError::InvalidApprover {
                acting: 1,
                level: 1
            })
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(ApprovalError::NotRequester).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[actix_web::test]
    async fn client_errors_expose_their_message() {
        let body = body_of(ApiError::from(ApprovalError::WrongLevel {
            expected: 2,
            got: 1,
        }))
        .await;
        assert_eq!(
            body["message"],
            "level 1 is not the current approval level (expected 2)"
        );
    }

    #[actix_web::test]
    async fn server_errors_hide_details() {
        let body = body_of(ApiError::Corrupt("level gap in request 9".into())).await;
        assert_eq!(body["message"], "Internal Server Error");
    }
}
