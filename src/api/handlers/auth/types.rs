//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupConfirmRequest {
    pub email: String,
    pub code: u32,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordConfirmRequest {
    pub email: String,
    pub code: u32,
    pub password: String,
    pub confirm_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangeEmailRequest {
    pub new_email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangeEmailConfirmRequest {
    pub new_email: String,
    pub code: u32,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangeNameRequest {
    pub new_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn signup_request_round_trips() -> Result<()> {
        let request = SignupRequest {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password: "Passw0rd!".to_string(),
            confirm_password: "Passw0rd!".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "ada@example.com");
        let decoded: SignupRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.name, "Ada Lovelace");
        Ok(())
    }

    #[test]
    fn confirm_request_takes_numeric_code() -> Result<()> {
        let decoded: SignupConfirmRequest =
            serde_json::from_value(serde_json::json!({"email": "a@x.com", "code": 123456}))?;
        assert_eq!(decoded.code, 123_456);
        Ok(())
    }

    #[test]
    fn session_response_round_trips() -> Result<()> {
        let response = SessionResponse {
            user_id: "id".to_string(),
            email: "ada@example.com".to_string(),
            display_name: "Ada".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        let decoded: SessionResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "ada@example.com");
        Ok(())
    }
}
