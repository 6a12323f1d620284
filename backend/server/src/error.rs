use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid signature")]
    MissingCredential,

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Invalid signature")]
    OpenRedirectRejected,

    #[error("{0}")]
    Validation(String),

    #[error("401 Unauthorized")]
    Unauthorized,

    #[error("Meal {0:?} not found")]
    MealNotFound(String),

    #[error("Feedback is busy after {attempts} attempts, try again")]
    TransactionConflict { attempts: u32 },

    #[error("Feedback write timed out, try again")]
    TransactionTimeout,

    #[error("Internal error")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingCredential
            | AppError::SignatureInvalid
            | AppError::OpenRedirectRejected
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::MealNotFound(_) => StatusCode::NOT_FOUND,
            AppError::TransactionConflict { .. } | AppError::TransactionTimeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Store(e) = &self {
            error!("Store failure: {e}");
        }

        (self.status(), self.to_string()).into_response()
    }
}
