//! Forgot-password flow.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::api::email::enqueue_email;

use super::error::ApiError;
use super::otp::{consume_code, OtpOperation};
use super::password::hash_password;
use super::sessions::delete_all_sessions;
use super::signup::issue_code_response;
use super::state::AuthState;
use super::types::{ForgotPasswordConfirmRequest, ForgotPasswordRequest, MessageResponse};
use super::users::{find_by_email, update_password};
use super::utils::{normalize_email, valid_email, validate_password};

/// Request a password-reset code for a known email.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset code sent", body = MessageResponse),
        (status = 404, description = "User not found"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn forgot(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return ApiError::validation("Please enter a valid email").into_response();
    }

    match find_by_email(&pool, &email).await {
        Ok(Some(_)) => {}
        Ok(None) => return ApiError::UnknownUser.into_response(),
        Err(err) => {
            error!("Forgot-password lookup failed: {err}");
            return ApiError::Internal.into_response();
        }
    }

    issue_code_response(
        &pool,
        &auth_state,
        &email,
        OtpOperation::ForgotPassword,
        &json!({}),
        "forgot_password_otp",
    )
    .await
}

/// Reset the password with a valid code; every session is revoked.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot/confirm",
    request_body = ForgotPasswordConfirmRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Validation error or invalid code"),
        (status = 404, description = "User not found")
    ),
    tag = "auth"
)]
pub async fn forgot_confirm(
    pool: Extension<PgPool>,
    payload: Option<Json<ForgotPasswordConfirmRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let email = normalize_email(&request.email);
    let mut errors = BTreeMap::new();
    if let Err(message) = validate_password(&request.password) {
        errors.insert("password".to_string(), message);
    }
    if request.password != request.confirm_password {
        errors.insert(
            "confirm_password".to_string(),
            "Passwords do not match".to_string(),
        );
    }
    if !errors.is_empty() {
        return ApiError::validation_fields("Failed to change the password", errors)
            .into_response();
    }

    let Ok(code) = i32::try_from(request.code) else {
        return ApiError::InvalidOrExpiredOtp.into_response();
    };

    match consume_code(&pool, code, &email, OtpOperation::ForgotPassword).await {
        Ok(Some(_)) => {}
        Ok(None) => return ApiError::InvalidOrExpiredOtp.into_response(),
        Err(err) => {
            error!("Failed to consume forgot-password code: {err}");
            return ApiError::Internal.into_response();
        }
    }

    let user = match find_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        // Rare: the account vanished between code issue and consumption.
        Ok(None) => return ApiError::UnknownUser.into_response(),
        Err(err) => {
            error!("Forgot-password confirm lookup failed: {err}");
            return ApiError::Internal.into_response();
        }
    };

    let new_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash new password: {err}");
            return ApiError::Internal.into_response();
        }
    };

    if let Err(err) = update_password(&pool, user.id, &new_hash).await {
        error!("Failed to update password: {err}");
        return ApiError::Internal.into_response();
    }

    // A reset must invalidate every existing session, no exceptions.
    if let Err(err) = delete_all_sessions(&pool, user.id, None).await {
        error!("Failed to revoke sessions after password reset: {err}");
        return ApiError::Internal.into_response();
    }

    let mail_payload = json!({ "email": user.email });
    if let Err(err) = enqueue_email(&pool.0, &user.email, "password_changed", &mail_payload).await
    {
        error!("Failed to enqueue password-changed email: {err}");
    }

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Password changed successfully".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::AuthConfig;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(AuthConfig::new(
            "https://priorly.app".to_string(),
        )))
    }

    #[tokio::test]
    async fn forgot_missing_payload() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = forgot(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn forgot_invalid_email() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = forgot(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(ForgotPasswordRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn forgot_confirm_rejects_weak_password_before_code_check() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = forgot_confirm(
            Extension(pool),
            Some(Json(ForgotPasswordConfirmRequest {
                email: "ada@example.com".to_string(),
                code: 123_456,
                password: "weak".to_string(),
                confirm_password: "weak".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
