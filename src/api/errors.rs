//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.
//! Raffle business errors map onto stable codes so clients can branch on them.

use crate::errors::RaffleError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code (INSUFFICIENT_PAYMENT, NOT_OPEN, ...)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    /// Request rejected on its own terms, whatever the round state
    InvalidRequest {
        code: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },
    /// Request conflicts with the current round state
    Conflict {
        code: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },
    PaymentRequired {
        code: &'static str,
        message: String,
    },
    Forbidden(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn forbidden(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Forbidden(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    pub fn service_unavailable(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::ServiceUnavailable(message),
            request_id,
        }
    }

    /// Map a raffle error onto an HTTP error
    pub fn from_raffle(request_id: String, error: RaffleError) -> Self {
        let message = error.to_string();
        let kind = match &error {
            RaffleError::InsufficientPayment { paid, required } => ApiErrorKind::InvalidRequest {
                code: "INSUFFICIENT_PAYMENT",
                message,
                details: Some(serde_json::json!({
                    "paid": paid.to_string(),
                    "required": required.to_string(),
                })),
            },
            RaffleError::NotOpen { state } => ApiErrorKind::Conflict {
                code: "NOT_OPEN",
                message,
                details: Some(serde_json::json!({ "state": state })),
            },
            RaffleError::RoundFull { max } => ApiErrorKind::Conflict {
                code: "ROUND_FULL",
                message,
                details: Some(serde_json::json!({ "max_players": max })),
            },
            RaffleError::UpkeepNotNeeded { diagnostics } => ApiErrorKind::Conflict {
                code: "UPKEEP_NOT_NEEDED",
                message,
                details: serde_json::to_value(diagnostics).ok(),
            },
            RaffleError::PaymentRejected { .. } => ApiErrorKind::PaymentRequired {
                code: "PAYMENT_REJECTED",
                message,
            },
            RaffleError::Oracle(_) | RaffleError::EngineUnavailable => {
                ApiErrorKind::ServiceUnavailable(message)
            }
            RaffleError::UnauthorizedCaller { .. } => ApiErrorKind::Forbidden(message),
            _ => ApiErrorKind::InternalError(message),
        };
        Self { kind, request_id }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::InvalidRequest { code, message, .. } | ApiErrorKind::Conflict { code, message, .. } => {
                write!(f, "[{}] {}: {}", self.request_id, code, message)
            }
            ApiErrorKind::PaymentRequired { code, message } => {
                write!(f, "[{}] {}: {}", self.request_id, code, message)
            }
            ApiErrorKind::Forbidden(msg) => write!(f, "[{}] Forbidden: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
            ApiErrorKind::ServiceUnavailable(msg) => {
                write!(f, "[{}] Service Unavailable: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiErrorKind::InvalidRequest { code, message, details } => {
                (StatusCode::BAD_REQUEST, code, message, details)
            }
            ApiErrorKind::Conflict { code, message, details } => (StatusCode::CONFLICT, code, message, details),
            ApiErrorKind::PaymentRequired { code, message } => {
                (StatusCode::PAYMENT_REQUIRED, code, message, None)
            }
            ApiErrorKind::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None)
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg, None)
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::RaffleState;
    use crate::errors::PaymentError;

    #[test]
    fn test_status_codes() {
        let cases = [
            (RaffleError::InsufficientPayment { paid: 1, required: 2 }, StatusCode::BAD_REQUEST),
            (RaffleError::NotOpen { state: RaffleState::Calculating }, StatusCode::CONFLICT),
            (RaffleError::RoundFull { max: 1 }, StatusCode::CONFLICT),
            (
                RaffleError::PaymentRejected {
                    player: Default::default(),
                    amount: 1,
                    reason: PaymentError::InsufficientBalance { available: 0, needed: 1 },
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (RaffleError::EngineUnavailable, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (error, status) in cases {
            let response = ApiError::from_raffle("req-1".to_string(), error).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
