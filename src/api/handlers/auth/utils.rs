//! Small helpers for input validation and session token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

const MAX_EMAIL_LENGTH: usize = 100;
const MIN_NAME_LENGTH: usize = 3;
const MAX_NAME_LENGTH: usize = 120;
const MIN_PASSWORD_LENGTH: usize = 8;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    if email_normalized.len() > MAX_EMAIL_LENGTH {
        return false;
    }
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Validate a display name: letters, dots and single spaces, bounded length.
pub(crate) fn validate_display_name(name: &str) -> Result<(), String> {
    if name.len() < MIN_NAME_LENGTH {
        return Err("Name should contain at least 3 characters".to_string());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err("Name cannot be more than 120 characters long".to_string());
    }
    let shape = Regex::new(r"^[A-Za-z]+(\.[A-Za-z]+)*( [A-Za-z]+(\.[A-Za-z]+)*)*$")
        .is_ok_and(|regex| regex.is_match(name));
    if shape {
        Ok(())
    } else {
        Err("Name can only contain letters, dots and spaces".to_string())
    }
}

/// Validate password complexity; returns the first violated rule.
pub(crate) fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }
    if !password
        .chars()
        .any(|c| c.is_ascii_punctuation() || c == ' ')
    {
        return Err("Password must contain at least one special character".to_string());
    }
    Ok(())
}

/// Create a new session token for the auth cookie.
/// The raw value is only returned to set the cookie; the database stores a hash.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the database.
/// The hash is used for lookups when the cookie is presented.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23503"),
        _ => false,
    }
}

/// Name of the violated unique constraint, when the error is one.
///
/// Used by the OTP ledger to tell a code collision (retry) from an email
/// collision (lost the per-email race).
pub(crate) fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if is_unique_violation(err) => {
            db_err.constraint().map(str::to_string)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_email_rejects_overlong() {
        let local = "a".repeat(95);
        assert!(!valid_email(&format!("{local}@example.com")));
    }

    #[test]
    fn display_name_rules() {
        assert!(validate_display_name("Ada Lovelace").is_ok());
        assert!(validate_display_name("J.R.R Tolkien").is_ok());
        assert!(validate_display_name("Al").is_err());
        assert!(validate_display_name("Robert'); DROP TABLE").is_err());
        assert!(validate_display_name(&"a".repeat(121)).is_err());
    }

    #[test]
    fn password_rules_in_order() {
        assert_eq!(
            validate_password("Ab1!"),
            Err("Password must be at least 8 characters long".to_string())
        );
        assert_eq!(
            validate_password("ALLUPPER1!"),
            Err("Password must contain at least one lowercase letter".to_string())
        );
        assert_eq!(
            validate_password("alllower1!"),
            Err("Password must contain at least one uppercase letter".to_string())
        );
        assert_eq!(
            validate_password("NoDigits!"),
            Err("Password must contain at least one digit".to_string())
        );
        assert_eq!(
            validate_password("NoSpecial1"),
            Err("Password must contain at least one special character".to_string())
        );
        assert!(validate_password("Passw0rd!").is_ok());
    }

    #[test]
    fn generate_session_token_round_trip() {
        let decoded_len = generate_session_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn hash_session_token_stable() {
        let first = hash_session_token("token");
        let second = hash_session_token("token");
        let different = hash_session_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn is_unique_violation_ignores_other_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_foreign_key_violation(&sqlx::Error::RowNotFound));
        assert!(unique_violation_constraint(&sqlx::Error::RowNotFound).is_none());
    }
}
