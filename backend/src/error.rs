use std::{error::Error, fmt, io};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use common::req::ErrorResponse;
use log::error;

/// Request-terminating failures. Each maps to one status code and one short
/// machine-readable reason in the `{ok: false, err}` body.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    MissingField,
    InvalidNumber,
    OutOfRange,
    WriteFailed(io::Error),
    ReadFailed(io::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::MissingField => "missing t/h",
            ApiError::InvalidNumber => "invalid t/h",
            ApiError::OutOfRange => "out_of_range",
            ApiError::WriteFailed(_) => "write_failed",
            ApiError::ReadFailed(_) => "read_failed",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::WriteFailed(e) => write!(f, "write failed: {}", e),
            ApiError::ReadFailed(e) => write!(f, "read failed: {}", e),
            other => f.write_str(other.code()),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::WriteFailed(e) | ApiError::ReadFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MissingField | ApiError::InvalidNumber => StatusCode::BAD_REQUEST,
            ApiError::OutOfRange => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::WriteFailed(_) | ApiError::ReadFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::WriteFailed(_) | ApiError::ReadFailed(_) = self {
            error!("{}", self);
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(self.code()))
    }
}
