//! Change-email flow.
//!
//! The highest-value account-takeover target, so it is triple-gated: a live
//! session, a fresh password re-confirmation, and a code sent to the new
//! address whose payload pins the requesting user.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::enqueue_email;

use super::error::ApiError;
use super::otp::{consume_code, ChangeEmailPayload, OtpOperation};
use super::password::verify_password;
use super::principal::require_auth;
use super::signup::issue_code_response;
use super::state::AuthState;
use super::types::{ChangeEmailConfirmRequest, ChangeEmailRequest, MessageResponse};
use super::users::{email_taken, find_by_id, update_email, UpdateEmailOutcome};
use super::utils::{normalize_email, valid_email};

/// Start an email change: verify the password, then send a code to the new
/// address.
#[utoipa::path(
    post,
    path = "/v1/auth/change-email",
    request_body = ChangeEmailRequest,
    responses(
        (status = 200, description = "Verification code sent to the new address", body = MessageResponse),
        (status = 401, description = "Not logged in or wrong password"),
        (status = 409, description = "Email already taken"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn change_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangeEmailRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let new_email = normalize_email(&request.new_email);
    if !valid_email(&new_email) {
        return ApiError::validation("Please enter a valid email").into_response();
    }
    if new_email == principal.email {
        return ApiError::validation("New email matches the current one").into_response();
    }

    // Fresh password re-confirmation; the session alone is not enough here.
    let user = match find_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return ApiError::Unauthorized.into_response(),
        Err(err) => {
            error!("Change-email lookup failed: {err}");
            return ApiError::Internal.into_response();
        }
    };
    if !verify_password(&request.password, &user.password_hash) {
        return ApiError::InvalidCredentials.into_response();
    }

    match email_taken(&pool, &new_email).await {
        Ok(false) => {}
        Ok(true) => return ApiError::DuplicateEmail.into_response(),
        Err(err) => {
            error!("Failed to check email availability: {err}");
            return ApiError::Internal.into_response();
        }
    }

    let otp_payload = match serde_json::to_value(ChangeEmailPayload {
        user_id: principal.user_id,
    }) {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to serialize change-email payload: {err}");
            return ApiError::Internal.into_response();
        }
    };

    issue_code_response(
        &pool,
        &auth_state,
        &new_email,
        OtpOperation::ChangeEmail,
        &otp_payload,
        "change_email_otp",
    )
    .await
}

/// Apply the email change after the code sent to the new address is
/// consumed by the same user that requested it.
#[utoipa::path(
    post,
    path = "/v1/auth/change-email/confirm",
    request_body = ChangeEmailConfirmRequest,
    responses(
        (status = 200, description = "Email changed", body = MessageResponse),
        (status = 400, description = "Invalid or expired code"),
        (status = 401, description = "Not logged in"),
        (status = 409, description = "Email already taken")
    ),
    tag = "auth"
)]
pub async fn change_email_confirm(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ChangeEmailConfirmRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let new_email = normalize_email(&request.new_email);
    let Ok(code) = i32::try_from(request.code) else {
        return ApiError::InvalidOrExpiredOtp.into_response();
    };

    let payload = match consume_code(&pool, code, &new_email, OtpOperation::ChangeEmail).await {
        Ok(Some(payload)) => payload,
        Ok(None) => return ApiError::InvalidOrExpiredOtp.into_response(),
        Err(err) => {
            error!("Failed to consume change-email code: {err}");
            return ApiError::Internal.into_response();
        }
    };

    let pinned: ChangeEmailPayload = match serde_json::from_value(payload) {
        Ok(pinned) => pinned,
        Err(err) => {
            error!("Invalid change-email payload in ledger: {err}");
            return ApiError::Internal.into_response();
        }
    };
    // A code requested by someone else is as good as no code.
    if pinned.user_id != principal.user_id {
        return ApiError::InvalidOrExpiredOtp.into_response();
    }

    match update_email(&pool, principal.user_id, &new_email).await {
        Ok(UpdateEmailOutcome::Updated) => {}
        Ok(UpdateEmailOutcome::DuplicateEmail) => {
            return ApiError::DuplicateEmail.into_response()
        }
        Err(err) => {
            error!("Failed to update email: {err}");
            return ApiError::Internal.into_response();
        }
    }

    // Notify both addresses; neither failure undoes the change.
    let old_payload = json!({ "email": principal.email, "new_email": new_email });
    if let Err(err) = enqueue_email(&pool.0, &principal.email, "email_changed_old", &old_payload)
        .await
    {
        error!("Failed to enqueue email-changed notice (old): {err}");
    }
    let new_payload = json!({ "email": new_email });
    if let Err(err) = enqueue_email(&pool.0, &new_email, "email_changed_new", &new_payload).await {
        error!("Failed to enqueue email-changed notice (new): {err}");
    }

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Email changed successfully".to_string(),
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
    async fn change_email_requires_session() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = change_email(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Some(Json(ChangeEmailRequest {
                new_email: "new@example.com".to_string(),
                password: "Passw0rd!".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn change_email_confirm_requires_session() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = change_email_confirm(
            HeaderMap::new(),
            Extension(pool),
            Some(Json(ChangeEmailConfirmRequest {
                new_email: "new@example.com".to_string(),
                code: 123_456,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
