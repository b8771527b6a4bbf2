//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via session cookie.
//! 2) Resolve the current user from the database.
//! 3) Apply allow-listed updates and session management.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::api::email::enqueue_email;

use super::auth::error::ApiError;
use super::auth::password::{hash_password, verify_password};
use super::auth::principal::require_auth;
use super::auth::session::cleared_cookie_response;
use super::auth::sessions::delete_all_sessions;
use super::auth::state::AuthState;
use super::auth::types::{
    ChangeNameRequest, ChangePasswordRequest, DeleteAccountRequest, MeResponse, MessageResponse,
};
use super::auth::users::{
    delete_user, find_by_id, update_display_name, update_password,
};
use super::auth::utils::{validate_display_name, validate_password};

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile", body = MeResponse),
        (status = 401, description = "Missing or invalid session cookie")
    ),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match find_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => {
            let response = MeResponse {
                id: user.id.to_string(),
                email: user.email,
                display_name: user.display_name,
                created_at: user.created_at,
                updated_at: user.updated_at,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch profile: {err}");
            ApiError::Internal.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/me/name",
    request_body = ChangeNameRequest,
    responses(
        (status = 200, description = "Name changed", body = MessageResponse),
        (status = 400, description = "Invalid name"),
        (status = 401, description = "Missing or invalid session cookie")
    ),
    tag = "me"
)]
pub async fn change_name(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ChangeNameRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let new_name = request.new_name.trim();
    if let Err(message) = validate_display_name(new_name) {
        let mut errors = BTreeMap::new();
        errors.insert("new_name".to_string(), message);
        return ApiError::validation_fields("Please enter a valid name", errors).into_response();
    }

    if let Err(err) = update_display_name(&pool, principal.user_id, new_name).await {
        error!("Failed to change display name: {err}");
        return ApiError::Internal.into_response();
    }

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Name changed successfully".to_string(),
        }),
    )
        .into_response()
}

/// Change the password of a logged-in user.
///
/// Every other session is revoked; the one making the change stays valid so
/// the user is not logged out from under their own request.
#[utoipa::path(
    post,
    path = "/v1/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Missing session or wrong current password")
    ),
    tag = "me"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let mut errors = BTreeMap::new();
    if let Err(message) = validate_password(&request.new_password) {
        errors.insert("new_password".to_string(), message);
    }
    if request.new_password != request.confirm_password {
        errors.insert(
            "confirm_password".to_string(),
            "Passwords do not match".to_string(),
        );
    }
    if !errors.is_empty() {
        return ApiError::validation_fields("Failed to change user password", errors)
            .into_response();
    }

    let user = match find_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return ApiError::Unauthorized.into_response(),
        Err(err) => {
            error!("Change-password lookup failed: {err}");
            return ApiError::Internal.into_response();
        }
    };
    if !verify_password(&request.password, &user.password_hash) {
        return ApiError::InvalidCredentials.into_response();
    }

    let new_hash = match hash_password(&request.new_password) {
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

    if let Err(err) =
        delete_all_sessions(&pool, user.id, Some(principal.token_hash.as_slice())).await
    {
        error!("Failed to revoke other sessions: {err}");
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
            message: "Password updated successfully".to_string(),
        }),
    )
        .into_response()
}

/// Delete the account and everything it owns.
#[utoipa::path(
    post,
    path = "/v1/me/delete",
    request_body = DeleteAccountRequest,
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Missing session or wrong password")
    ),
    tag = "me"
)]
pub async fn delete_account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<DeleteAccountRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let user = match find_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return ApiError::Unauthorized.into_response(),
        Err(err) => {
            error!("Delete-account lookup failed: {err}");
            return ApiError::Internal.into_response();
        }
    };
    if !verify_password(&request.password, &user.password_hash) {
        return ApiError::InvalidCredentials.into_response();
    }

    if let Err(err) = delete_user(&pool, user.id).await {
        error!("Failed to delete account: {err}");
        return ApiError::Internal.into_response();
    }

    cleared_cookie_response(auth_state.config())
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
    async fn get_me_requires_session() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = get_me(HeaderMap::new(), Extension(pool))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn change_name_requires_session() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = change_name(
            HeaderMap::new(),
            Extension(pool),
            Some(Json(ChangeNameRequest {
                new_name: "Ada Lovelace".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn delete_account_requires_session() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = delete_account(
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()),
            Some(Json(DeleteAccountRequest {
                password: "Passw0rd!".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
