//! # Priorly (Accounts & To-do API)
//!
//! `priorly` is the backend for the Priorly to-do application. It owns user
//! accounts, one-time-code (OTP) verification flows, server-side sessions,
//! and the per-user to-do CRUD API.
//!
//! ## Authentication
//!
//! Passwords are stored as salted Argon2 hashes and verified through the
//! hash primitive only. Every flow that proves control of an email address
//! (signup, forgot-password, change-email) goes through the OTP ledger: a
//! short-lived 6-digit code bound to an email and a declared operation,
//! rate-limited per email and consumable exactly once.
//!
//! ## Sessions
//!
//! Sessions are opaque 256-bit tokens carried in an `HttpOnly` cookie. The
//! database stores only a SHA-256 hash of the token. A user may hold many
//! concurrent sessions; password resets revoke all of them.
//!
//! ## Error shape
//!
//! Business failures are returned as `{kind, message, errors?}` envelopes
//! with stable machine-readable kinds. Unknown email and wrong password are
//! deliberately indistinguishable to callers.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
