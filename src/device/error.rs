use crate::remote::DeviceReply;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown upload id: {0}")]
    UnknownSession(String),

    #[error("Range starts at {got}, expected {expected}")]
    RangeMismatch { expected: u64, got: u64 },

    #[error("Injected failure for chunk {0}")]
    InjectedFailure(u32),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl IntoResponse for DeviceError {
    fn into_response(self) -> Response {
        let status = match &self {
            DeviceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DeviceError::UnknownSession(_) => StatusCode::NOT_FOUND,
            DeviceError::RangeMismatch { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            DeviceError::InjectedFailure(_) | DeviceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(DeviceReply::error(-1, self.to_string()))).into_response()
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;
