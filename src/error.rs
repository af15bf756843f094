use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Failure kinds surfaced by the account service to its callers.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("requested user was not found")]
    NotFound,
    #[error("username is already taken")]
    Conflict,
    #[error("bad parameter input: {0}")]
    BadParamInput(String),
    #[error("operation timed out")]
    Timeout,
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn bad_input(msg: impl Into<String>) -> Self {
        Self::BadParamInput(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::BadParamInput(_) => "BAD_PARAM_INPUT",
            Self::Timeout => "TIMEOUT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::BadParamInput(_) => StatusCode::BAD_REQUEST,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref e) = self {
            error!(error = %e, kind = "INTERNAL", "internal error");
        }
        let body = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
