//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::AutoMlError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Training error: {0}")]
    Training(String),

    /// Any failure while predicting; reported to the client verbatim
    #[error("Prediction error: {0}")]
    Prediction(String),
}

impl From<AutoMlError> for ServerError {
    fn from(err: AutoMlError) -> Self {
        match err {
            AutoMlError::NotFound(_) => ServerError::NotFound(err.to_string()),
            e if e.is_client_error() => ServerError::BadRequest(e.to_string()),
            e => ServerError::Internal(e.to_string()),
        }
    }
}

impl ServerError {
    /// Map a train flow failure: input problems stay 4xx, the rest is a training error.
    pub fn from_training(err: AutoMlError) -> Self {
        if err.is_client_error() {
            ServerError::from(err)
        } else {
            ServerError::Training(err.to_string())
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            }
            ServerError::Training(msg) => {
                tracing::error!(detail = %msg, "Training error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Training failed. Check server logs for details.".to_string())
            }
            ServerError::Prediction(msg) => {
                tracing::warn!(detail = %msg, "Prediction rejected");
                (StatusCode::UNAUTHORIZED, msg.clone())
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::from(AutoMlError::Validation("bad".into())), StatusCode::BAD_REQUEST),
            (ServerError::from(AutoMlError::NotFound("run 1".into())), StatusCode::NOT_FOUND),
            (ServerError::from(AutoMlError::Engine("down".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ServerError::from_training(AutoMlError::Engine("down".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ServerError::Prediction("layout".into()), StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_training_keeps_client_errors() {
        let err = ServerError::from_training(AutoMlError::Validation("budget".into()));
        assert!(matches!(err, ServerError::BadRequest(_)));
    }
}
