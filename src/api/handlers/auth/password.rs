//! Password hashing and verification.
//!
//! Argon2id with a per-record random salt, stored as a PHC string. Plaintext
//! never reaches the database and comparisons only go through the verifier.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;

/// Hash of a throwaway password, verified against when the email does not
/// resolve to a user so both login failures cost the same.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| {
    hash_password("priorly-dummy-credential").unwrap_or_else(|_| String::new())
});

/// Hash a plaintext password into a PHC string with a fresh salt.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC string.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Burn a verification against the dummy hash to equalize timing when no
/// user exists for the presented email.
pub(crate) fn verify_dummy(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trip() {
        let hash = hash_password("Passw0rd!").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Passw0rd!", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let first = hash_password("Passw0rd!").expect("hash");
        let second = hash_password("Passw0rd!").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("Passw0rd!", "not-a-phc-string"));
    }

    #[test]
    fn dummy_verification_does_not_panic() {
        verify_dummy("anything");
    }
}
