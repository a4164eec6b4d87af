//! Error taxonomy
//!
//! Every fallible path in the crate maps into one of these variants. The
//! payment-affecting rule: any failure leaves `payment_status` untouched —
//! a missed confirmation is recovered by a later reconcile call, an incorrect
//! confirmation is not recoverable at all.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::domain::aggregates::order::WorkStatus;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any write.
    #[error("{0}")]
    Validation(String),

    /// Illegal work-status edge.
    #[error("cannot transition from '{from}' to '{to}'")]
    InvalidTransition { from: WorkStatus, to: WorkStatus },

    /// Payment processor transport or logic failure.
    #[error("payment processor error: {0}")]
    Processor(String),

    /// Unknown order or payment session.
    #[error("{0} not found")]
    NotFound(String),

    /// Catalog/data mismatch; implies a defect upstream.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Order store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound("record".into()),
            other => Error::Storage(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(e: validator::ValidationErrors) -> Self {
        Error::Validation(e.to_string())
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Processor(_) => StatusCode::BAD_GATEWAY,
            Error::Configuration(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
