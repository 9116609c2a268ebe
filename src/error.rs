//! Error types for Carrel server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    BadValue = 5,
    CopyAlreadyClaimed = 6,
    CopyUnavailable = 7,
    AlreadyInCart = 8,
    CartFull = 9,
    EmptyCart = 10,
    InvalidSlot = 11,
    StateViolation = 12,
    Unavailable = 13,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Copy {0} is already in the cart")]
    AlreadyInCart(i32),

    #[error("Cart is full (limit {0})")]
    CartFull(usize),

    #[error("Copy {0} is not available")]
    CopyUnavailable(i32),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Copy {0} is already claimed by another reservation")]
    CopyAlreadyClaimed(i32),

    #[error("This reservation can no longer be modified")]
    StateViolation,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Unavailable(format!("Redis error: {}", e))
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorCode::NotFound, msg.clone())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::InvalidSlot(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::InvalidSlot, msg.clone())
            }
            AppError::AlreadyInCart(_) => {
                (StatusCode::CONFLICT, ErrorCode::AlreadyInCart, self.to_string())
            }
            AppError::CartFull(_) => {
                (StatusCode::CONFLICT, ErrorCode::CartFull, self.to_string())
            }
            AppError::CopyUnavailable(_) => {
                (StatusCode::CONFLICT, ErrorCode::CopyUnavailable, self.to_string())
            }
            AppError::EmptyCart => {
                (StatusCode::BAD_REQUEST, ErrorCode::EmptyCart, self.to_string())
            }
            AppError::CopyAlreadyClaimed(_) => {
                (StatusCode::CONFLICT, ErrorCode::CopyAlreadyClaimed, self.to_string())
            }
            AppError::StateViolation => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::StateViolation, self.to_string())
            }
            AppError::Unavailable(msg) => {
                tracing::error!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::Unavailable,
                    "Service temporarily unavailable".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
