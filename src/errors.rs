use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error body returned to HTTP callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Payment Required")
    pub error: String,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unsupported payment handler: {0}")]
    UnsupportedHandler(String),

    #[error("Payment declined: {message}")]
    PaymentDeclined { code: String, message: String },

    #[error("Idempotency conflict: {0}")]
    IdempotencyConflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::UnsupportedHandler(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidState(_)
            | Self::IdempotencyConflict(_)
            | Self::InsufficientStock(_) => StatusCode::CONFLICT,
            Self::PaymentDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::CacheError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code carried in the response body.
    pub fn error_code(&self) -> String {
        match self {
            Self::ValidationError(_) => "INVALID_REQUEST".to_string(),
            Self::NotFound(_) => "RESOURCE_NOT_FOUND".to_string(),
            Self::InvalidState(_) => "CHECKOUT_NOT_MODIFIABLE".to_string(),
            Self::UnsupportedHandler(_) => "UNSUPPORTED_HANDLER".to_string(),
            Self::Unauthorized(_) => "UNAUTHORIZED".to_string(),
            Self::PaymentDeclined { code, .. } => code.clone(),
            Self::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT".to_string(),
            Self::InsufficientStock(_) => "OUT_OF_STOCK".to_string(),
            Self::CacheError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                "INTERNAL_ERROR".to_string()
            }
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::CacheError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.error_code(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}

/// Recoverable resolver failures. These are reported back on the checkout as
/// error messages without rejecting the remainder of the merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    UnknownCode(String),
    InvalidDestination(String),
    InvalidOption(String),
}

impl ResolutionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCode(_) => "discount_code_unknown",
            Self::InvalidDestination(_) => "fulfillment_destination_invalid",
            Self::InvalidOption(_) => "fulfillment_option_invalid",
        }
    }

    pub fn param(&self) -> &'static str {
        match self {
            Self::UnknownCode(_) => "discounts.codes",
            Self::InvalidDestination(_) => "fulfillment.methods.selected_destination_id",
            Self::InvalidOption(_) => "fulfillment.methods.groups.selected_option_id",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::UnknownCode(code) => format!("Discount code {} is not recognized", code),
            Self::InvalidDestination(id) => {
                format!("Destination {} does not match any known destination", id)
            }
            Self::InvalidOption(id) => {
                format!("Option {} does not match any option in the targeted group", id)
            }
        }
    }
}
