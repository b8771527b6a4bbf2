//! Typed error envelope returned by every handler.
//!
//! Business failures carry a stable machine-readable `kind` plus a human
//! message; validation failures additionally report per-field errors.
//! Storage failures are logged where they happen and reach callers only as
//! an opaque `internal_error`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum ApiError {
    Validation {
        message: String,
        errors: BTreeMap<String, String>,
    },
    DuplicateEmail,
    InvalidCredentials,
    RateLimited,
    InvalidOrExpiredOtp,
    GenerationTimeout,
    UnknownUser,
    Unauthorized,
    Forbidden(&'static str),
    NotFound(&'static str),
    Internal,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ApiError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn validation_fields(message: impl Into<String>, errors: BTreeMap<String, String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::DuplicateEmail => "duplicate_email",
            Self::InvalidCredentials => "invalid_credentials",
            Self::RateLimited => "rate_limited",
            Self::InvalidOrExpiredOtp => "invalid_or_expired_otp",
            Self::GenerationTimeout => "generation_timeout",
            Self::UnknownUser => "unknown_user",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Internal => "internal_error",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidOrExpiredOtp => StatusCode::BAD_REQUEST,
            // Transient: the code space was exhausted, the caller may retry.
            Self::GenerationTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnknownUser | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::DuplicateEmail => "Email is already taken".to_string(),
            // Same message for unknown email and wrong password.
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::RateLimited => {
                "Please wait for some time before requesting a new code".to_string()
            }
            Self::InvalidOrExpiredOtp => "Please enter a valid code".to_string(),
            Self::GenerationTimeout => {
                "Could not issue a code right now, please retry".to_string()
            }
            Self::UnknownUser => "User not found".to_string(),
            Self::Unauthorized => "Not logged in".to_string(),
            Self::Forbidden(message) => (*message).to_string(),
            Self::NotFound(message) => (*message).to_string(),
            Self::Internal => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let errors = match &self {
            ApiError::Validation { errors, .. } if !errors.is_empty() => Some(errors.clone()),
            _ => None,
        };
        let body = ErrorBody {
            kind: self.kind().to_string(),
            message: self.message(),
            errors,
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ApiError::DuplicateEmail.kind(), "duplicate_email");
        assert_eq!(ApiError::InvalidCredentials.kind(), "invalid_credentials");
        assert_eq!(ApiError::RateLimited.kind(), "rate_limited");
        assert_eq!(
            ApiError::InvalidOrExpiredOtp.kind(),
            "invalid_or_expired_otp"
        );
        assert_eq!(ApiError::GenerationTimeout.kind(), "generation_timeout");
        assert_eq!(ApiError::Internal.kind(), "internal_error");
    }

    #[test]
    fn status_codes_match_kinds() {
        assert_eq!(ApiError::DuplicateEmail.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_body_carries_field_errors() {
        let mut errors = BTreeMap::new();
        errors.insert("password".to_string(), "too short".to_string());
        let error = ApiError::validation_fields("Unable to create user", errors);

        let body = ErrorBody {
            kind: error.kind().to_string(),
            message: "Unable to create user".to_string(),
            errors: match &error {
                ApiError::Validation { errors, .. } => Some(errors.clone()),
                _ => None,
            },
        };
        let value = serde_json::to_value(&body).expect("serializable");
        assert_eq!(value["kind"], "validation_error");
        assert_eq!(value["errors"]["password"], "too short");
    }

    #[test]
    fn non_validation_body_omits_errors() {
        let body = ErrorBody {
            kind: ApiError::RateLimited.kind().to_string(),
            message: "wait".to_string(),
            errors: None,
        };
        let value = serde_json::to_value(&body).expect("serializable");
        assert!(value.get("errors").is_none());
    }
}
