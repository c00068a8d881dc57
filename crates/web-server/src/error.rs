use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine::EngineError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Missing X-User-Id header")]
    MissingActor,
    #[error("{}", .0.body_text())]
    Body(#[from] JsonRejection),
    #[error("{}", .0.body_text())]
    Query(#[from] QueryRejection),
    #[error("{}", .0.body_text())]
    Path(#[from] PathRejection),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(err) => match err {
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
                EngineError::InvalidState(_)
                | EngineError::InsufficientAvailable { .. }
                | EngineError::NotTradeable { .. } => StatusCode::BAD_REQUEST,
                EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::Conflict(_) => StatusCode::CONFLICT,
                EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::MissingActor => StatusCode::UNAUTHORIZED,
            AppError::Body(rejection) => rejection.status(),
            AppError::Query(rejection) => rejection.status(),
            AppError::Path(rejection) => rejection.status(),
        }
    }
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::Engine(EngineError::Persistence(err)) => {
                tracing::error!(error = ?err, "Persistence error.");
                "An internal storage error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
