use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt::Display;

/// Error returned by every handler, rendered as
/// `{"error": <message>, "details": <cause>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// Failure reported with an explicit status, e.g. mirrored from a model
    /// provider.
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        details: Option<String>,
    },

    #[error("{message}: {details}")]
    Internal { message: String, details: String },

    #[error("Content selector not found")]
    SelectorNotFound { url: String, selector: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized() -> Self {
        ApiError::Unauthorized("No autorizado".to_string())
    }

    /// 500 carrying only the failure message, as the job routes report it.
    pub fn failed(cause: &anyhow::Error) -> Self {
        log::error!("{:#}", cause);
        ApiError::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: cause.to_string(),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>, cause: impl Display) -> Self {
        ApiError::Internal {
            message: message.into(),
            details: cause.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": message }))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::Upstream {
                status,
                message,
                details,
            } => {
                let body = match details {
                    Some(details) => json!({ "error": message, "details": details }),
                    None => json!({ "error": message }),
                };
                (status, body)
            }
            ApiError::Internal { message, details } => {
                log::error!("{}: {}", message, details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": message, "details": details }),
                )
            }
            ApiError::SelectorNotFound { url, selector } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "Content selector not found",
                    "url": url,
                    "selector": selector,
                    "suggestion": "Inspect the HTML and provide a valid CSS selector via ?selector=yourSelector",
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
