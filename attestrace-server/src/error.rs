//! API error handling module
//!
//! Every failure leaves the dispatcher as `{"outcome": "failure", "error": ...}`
//! with a status code; internal details are logged, never returned.

use attestrace_core::{ChallengeError, TraceError, VerifyError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::store::StoreError;

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";

/// Client-facing messages
pub mod messages {
    pub const INVALID_REQUEST_BODY: &str = "Invalid request body";
    pub const INVALID_KEY_ID: &str = "Invalid key_id";
    pub const FAILED_TO_GENERATE_CHALLENGE: &str = "Failed to generate challenge";
    pub const ATTESTATION_VERIFICATION_FAILED: &str = "Attestation verification failed";
    pub const INVALID_TRACE_FORMAT: &str = "Invalid trace format";
    pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";
    pub const FAILED_TO_STORE_TRACE: &str = "Failed to store trace";
}

/// Failure envelope
#[derive(Debug, Serialize, ToSchema)]
pub struct FailureResponse {
    /// Always "failure"
    pub outcome: String,
    pub error: String,
}

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body is not a JSON object
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request exceeds the configured size ceiling
    #[error("Request exceeds the {max} byte ceiling")]
    PayloadTooLarge { max: usize },

    /// `key_id` missing, not a string or empty
    #[error("Invalid key_id")]
    InvalidKeyId,

    /// Challenge derivation failed
    #[error("Challenge generation failed: {0}")]
    ChallengeGeneration(#[from] ChallengeError),

    /// Attestation is malformed or fails a check
    #[error("Attestation rejected: {reason}")]
    Attestation { reason: String, parse_failure: bool },

    /// Trace body failed validation
    #[error("Invalid trace: {0}")]
    InvalidTrace(#[from] TraceError),

    /// Blob store write failed
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Anything unexpected, reported as `<Kind>: <message>`
    #[error("{kind}: {message}")]
    Internal { kind: String, message: String },
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        Self::Attestation {
            parse_failure: err.is_parse_failure(),
            reason: err.to_string(),
        }
    }
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an attestation error for a request that carries no usable
    /// attestation fields
    pub fn malformed_attestation(reason: impl Into<String>) -> Self {
        Self::Attestation {
            reason: reason.into(),
            parse_failure: true,
        }
    }

    /// Create an internal error reported as `<kind>: <message>`
    pub fn internal(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidKeyId | Self::InvalidTrace(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Attestation { .. } => StatusCode::FORBIDDEN,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ChallengeGeneration(_) | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code for log correlation
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_REQUEST_BODY",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::InvalidKeyId => "INVALID_KEY_ID",
            Self::ChallengeGeneration(_) => "CHALLENGE_FAILED",
            Self::Attestation {
                parse_failure: true,
                ..
            } => "ATTESTATION_PARSE_FAILED",
            Self::Attestation { .. } => "ATTESTATION_FAILED",
            Self::InvalidTrace(e) if e.is_message_error() => "INVALID_MESSAGE",
            Self::InvalidTrace(_) => "INVALID_TRACE",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Get sanitized error message for client response
    pub fn client_message(&self) -> String {
        match self {
            Self::BadRequest(_) | Self::PayloadTooLarge { .. } => {
                messages::INVALID_REQUEST_BODY.to_string()
            }
            Self::InvalidKeyId => messages::INVALID_KEY_ID.to_string(),
            Self::ChallengeGeneration(_) => messages::FAILED_TO_GENERATE_CHALLENGE.to_string(),
            Self::Attestation { .. } => messages::ATTESTATION_VERIFICATION_FAILED.to_string(),
            Self::InvalidTrace(e) if e.is_message_error() => {
                messages::INVALID_MESSAGE_FORMAT.to_string()
            }
            Self::InvalidTrace(_) => messages::INVALID_TRACE_FORMAT.to_string(),
            Self::Storage(_) => messages::FAILED_TO_STORE_TRACE.to_string(),
            Self::Internal { .. } => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::PayloadTooLarge { .. } | Self::InvalidKeyId => {
                "bad_request"
            }
            Self::ChallengeGeneration(_) => "challenge",
            Self::Attestation { .. } => "attestation",
            Self::InvalidTrace(_) => "trace",
            Self::Storage(_) => "storage",
            Self::Internal { .. } => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        match &self {
            Self::Attestation {
                parse_failure: true,
                ..
            } => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Error while parsing attestation object"
                );
            }
            Self::Attestation { .. } => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Error verifying attestation"
                );
            }
            Self::BadRequest(_)
            | Self::PayloadTooLarge { .. }
            | Self::InvalidKeyId
            | Self::InvalidTrace(_) => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Client error"
                );
            }
            Self::Storage(_) => {
                tracing::error!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Storage unavailable"
                );
            }
            Self::ChallengeGeneration(_) | Self::Internal { .. } => {
                tracing::error!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Server error"
                );
            }
        }

        let body = FailureResponse {
            outcome: OUTCOME_FAILURE.to_string(),
            error: client_message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::PayloadTooLarge { max: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ApiError::InvalidKeyId.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::malformed_attestation("missing").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::ChallengeGeneration(ChallengeError::EmptyKeyId).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_trace_messages() {
        let message = ApiError::from(TraceError::MissingContent { index: 0 });
        assert_eq!(message.client_message(), "Invalid message format");

        let trace = ApiError::from(TraceError::EmptyMessages);
        assert_eq!(trace.client_message(), "Invalid trace format");
    }

    #[test]
    fn test_internal_message_names_kind() {
        let err = ApiError::internal("KeyError", "'model'");
        assert_eq!(err.client_message(), "KeyError: 'model'");
    }

    #[test]
    fn test_attestation_details_not_leaked() {
        let err = ApiError::Attestation {
            reason: "Certificate 1 signature verification failed".to_string(),
            parse_failure: false,
        };
        assert_eq!(err.client_message(), "Attestation verification failed");
    }
}
