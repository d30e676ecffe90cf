//! Error types for the application

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Color catalog is empty")]
    EmptyCatalog,

    #[error("Frame source error: {0}")]
    FrameSource(String),

    #[error("No frame available")]
    NoFrame,

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Frame loop is not running")]
    LoopUnavailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NoFrame => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::InvalidSetting(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::LoopUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Config(_)
            | AppError::EmptyCatalog
            | AppError::FrameSource(_)
            | AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, message).into_response()
    }
}
