//! Signup flow: request a code, then confirm it to create the account.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::api::email::enqueue_email;

use super::error::ApiError;
use super::otp::{consume_code, request_code, OtpOperation, RequestCodeOutcome, SignupPayload};
use super::password::hash_password;
use super::session::{authenticate_session, session_cookie};
use super::sessions::{insert_session, SessionCreateOutcome};
use super::state::AuthState;
use super::types::{MessageResponse, SessionResponse, SignupConfirmRequest, SignupRequest};
use super::users::{create_user, email_taken, CreateUserOutcome};
use super::utils::{normalize_email, valid_email, validate_display_name, validate_password};

/// Start signup: validate the request, then park the hashed credentials
/// behind a one-time code sent to the address being claimed.
#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Verification code sent", body = MessageResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Email already taken"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn signup(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    // A live session must log out before creating another account.
    match authenticate_session(&headers, &pool).await {
        Ok(None) => {}
        Ok(Some(_)) => return ApiError::validation("Please log out to continue").into_response(),
        Err(_) => return ApiError::Internal.into_response(),
    }

    let email = normalize_email(&request.email);
    if let Err(errors) = validate_signup(&request, &email) {
        return ApiError::validation_fields("Unable to create user", errors).into_response();
    }

    match email_taken(&pool, &email).await {
        Ok(false) => {}
        Ok(true) => return ApiError::DuplicateEmail.into_response(),
        Err(err) => {
            error!("Failed to check email availability: {err}");
            return ApiError::Internal.into_response();
        }
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash signup password: {err}");
            return ApiError::Internal.into_response();
        }
    };

    let otp_payload = match serde_json::to_value(SignupPayload {
        display_name: request.name.trim().to_string(),
        password_hash,
    }) {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to serialize signup payload: {err}");
            return ApiError::Internal.into_response();
        }
    };

    issue_code_response(
        &pool,
        &auth_state,
        &email,
        OtpOperation::Signup,
        &otp_payload,
        "signup_otp",
    )
    .await
}

/// Issue a code and its email inside one transaction, mapping ledger
/// outcomes to responses. Shared with the other code-requesting flows.
pub(super) async fn issue_code_response(
    pool: &PgPool,
    auth_state: &AuthState,
    email: &str,
    operation: OtpOperation,
    otp_payload: &serde_json::Value,
    template: &str,
) -> axum::response::Response {
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to start code request transaction: {err}");
            return ApiError::Internal.into_response();
        }
    };

    let outcome = match request_code(&mut tx, email, operation, otp_payload, auth_state.config())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Failed to request one-time code: {err}");
            let _ = tx.rollback().await;
            return ApiError::Internal.into_response();
        }
    };

    let code = match outcome {
        RequestCodeOutcome::Issued(code) => code,
        RequestCodeOutcome::RateLimited => {
            let _ = tx.rollback().await;
            return ApiError::RateLimited.into_response();
        }
        RequestCodeOutcome::GenerationTimeout => {
            let _ = tx.rollback().await;
            return ApiError::GenerationTimeout.into_response();
        }
    };

    let mail_payload = json!({ "email": email, "code": code });
    if let Err(err) = enqueue_email(&mut *tx, email, template, &mail_payload).await {
        error!("Failed to enqueue {template} email: {err}");
        let _ = tx.rollback().await;
        return ApiError::Internal.into_response();
    }

    if let Err(err) = tx.commit().await {
        error!("Failed to commit code request transaction: {err}");
        return ApiError::Internal.into_response();
    }

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Verification code sent, please check your email".to_string(),
        }),
    )
        .into_response()
}

/// Finish signup: consume the code, create the user, open a session.
#[utoipa::path(
    post,
    path = "/v1/auth/signup/confirm",
    request_body = SignupConfirmRequest,
    responses(
        (status = 201, description = "User created and logged in", body = SessionResponse),
        (status = 400, description = "Invalid or expired code"),
        (status = 409, description = "Email already taken")
    ),
    tag = "auth"
)]
pub async fn signup_confirm(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupConfirmRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let email = normalize_email(&request.email);
    let Ok(code) = i32::try_from(request.code) else {
        return ApiError::InvalidOrExpiredOtp.into_response();
    };

    let payload = match consume_code(&pool, code, &email, OtpOperation::Signup).await {
        Ok(Some(payload)) => payload,
        Ok(None) => return ApiError::InvalidOrExpiredOtp.into_response(),
        Err(err) => {
            error!("Failed to consume signup code: {err}");
            return ApiError::Internal.into_response();
        }
    };

    let signup: SignupPayload = match serde_json::from_value(payload) {
        Ok(signup) => signup,
        Err(err) => {
            error!("Invalid signup payload in ledger: {err}");
            return ApiError::Internal.into_response();
        }
    };

    // The code is already gone; a failure past this point means the user
    // must start over. Accepted trade-off, kept deliberate and visible.
    let user = match create_user(&pool, &email, &signup.password_hash, &signup.display_name).await
    {
        Ok(CreateUserOutcome::Created(user)) => user,
        Ok(CreateUserOutcome::DuplicateEmail) => return ApiError::DuplicateEmail.into_response(),
        Err(err) => {
            error!("Failed to create user after code consumption: {err}");
            return ApiError::Internal.into_response();
        }
    };

    // Welcome mail is best-effort; the account exists either way.
    let mail_payload = json!({ "email": user.email, "display_name": user.display_name });
    if let Err(err) = enqueue_email(&pool.0, &user.email, "welcome", &mail_payload).await {
        error!("Failed to enqueue welcome email: {err}");
    }

    let token =
        match insert_session(&pool, user.id, auth_state.config().session_ttl_seconds()).await {
            Ok(SessionCreateOutcome::Created(token)) => token,
            Ok(SessionCreateOutcome::UnknownUser) => {
                return ApiError::UnknownUser.into_response()
            }
            Err(err) => {
                error!("Failed to create signup session: {err}");
                return ApiError::Internal.into_response();
            }
        };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(&auth_state, &token) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    let response = SessionResponse {
        user_id: user.id.to_string(),
        email: user.email,
        display_name: user.display_name,
    };
    (StatusCode::CREATED, response_headers, Json(response)).into_response()
}

fn validate_signup(
    request: &SignupRequest,
    email_normalized: &str,
) -> Result<(), BTreeMap<String, String>> {
    let mut errors = BTreeMap::new();

    if let Err(message) = validate_display_name(request.name.trim()) {
        errors.insert("name".to_string(), message);
    }
    if !valid_email(email_normalized) {
        errors.insert("email".to_string(), "Please enter a valid email".to_string());
    }
    if let Err(message) = validate_password(&request.password) {
        errors.insert("password".to_string(), message);
    }
    if request.password != request.confirm_password {
        errors.insert(
            "confirm_password".to_string(),
            "Passwords do not match".to_string(),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(super::super::state::AuthConfig::new(
            "https://priorly.app".to_string(),
        )))
    }

    fn request(name: &str, email: &str, password: &str, confirm: &str) -> SignupRequest {
        SignupRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[test]
    fn validate_signup_accepts_good_request() {
        let req = request("Ada Lovelace", "ada@example.com", "Passw0rd!", "Passw0rd!");
        assert!(validate_signup(&req, "ada@example.com").is_ok());
    }

    #[test]
    fn validate_signup_reports_per_field() {
        let req = request("A", "not-an-email", "short", "different");
        let errors = validate_signup(&req, "not-an-email").expect_err("invalid");
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("password"));
        assert!(errors.contains_key("confirm_password"));
    }

    #[test]
    fn validate_signup_catches_password_mismatch_alone() {
        let req = request("Ada Lovelace", "ada@example.com", "Passw0rd!", "Passw0rd?");
        let errors = validate_signup(&req, "ada@example.com").expect_err("mismatch");
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key("confirm_password"));
    }

    #[tokio::test]
    async fn signup_missing_payload() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = signup(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn signup_confirm_missing_payload() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = signup_confirm(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn signup_confirm_rejects_out_of_range_code() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = signup_confirm(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(SignupConfirmRequest {
                email: "ada@example.com".to_string(),
                code: u32::MAX,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
