//! Password login.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::error::ApiError;
use super::password::{verify_dummy, verify_password};
use super::session::{authenticate_session, session_cookie};
use super::sessions::{insert_session, SessionCreateOutcome};
use super::state::AuthState;
use super::types::{LoginRequest, SessionResponse};
use super::users::find_by_email;
use super::utils::normalize_email;

/// Log in with email and password.
///
/// Unknown email and wrong password produce the same error, and the unknown
/// path still burns a hash verification so the two are not separable by
/// timing either.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    match authenticate_session(&headers, &pool).await {
        Ok(None) => {}
        Ok(Some(_)) => return ApiError::validation("Please log out to continue").into_response(),
        Err(_) => return ApiError::Internal.into_response(),
    }

    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return ApiError::validation("Email and password required").into_response();
    }

    let user = match find_by_email(&pool, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Login lookup failed: {err}");
            return ApiError::Internal.into_response();
        }
    };

    let Some(user) = user else {
        verify_dummy(&request.password);
        return ApiError::InvalidCredentials.into_response();
    };

    if !verify_password(&request.password, &user.password_hash) {
        return ApiError::InvalidCredentials.into_response();
    }

    let token =
        match insert_session(&pool, user.id, auth_state.config().session_ttl_seconds()).await {
            Ok(SessionCreateOutcome::Created(token)) => token,
            // The account vanished between lookup and session creation.
            Ok(SessionCreateOutcome::UnknownUser) => {
                return ApiError::InvalidCredentials.into_response()
            }
            Err(err) => {
                error!("Failed to create login session: {err}");
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
    (StatusCode::OK, response_headers, Json(response)).into_response()
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
    async fn login_missing_payload() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(
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
    async fn login_empty_fields() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Some(Json(LoginRequest {
                email: "  ".to_string(),
                password: String::new(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
