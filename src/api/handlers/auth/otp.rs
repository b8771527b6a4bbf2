//! One-time code ledger.
//!
//! Codes are 6-digit numbers bound to an email and a declared operation.
//! The `one_time_codes` table enforces one live record per email and global
//! uniqueness of live codes; this module only ever creates and deletes rows,
//! so records are immutable by construction.

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{Acquire, PgPool, Postgres, Row, Transaction};
use std::time::Instant;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use super::state::AuthConfig;
use super::utils::unique_violation_constraint;

const CODE_MIN: i32 = 100_000;
const CODE_MAX: i32 = 999_999;

const CODE_CONSTRAINT: &str = "one_time_codes_code_key";
const EMAIL_CONSTRAINT: &str = "one_time_codes_email_key";

/// Operation a code was issued for; consumption must declare the same one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OtpOperation {
    Signup,
    ChangeEmail,
    ForgotPassword,
}

impl OtpOperation {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::ChangeEmail => "change_email",
            Self::ForgotPassword => "forgot_password",
        }
    }
}

/// Payload stashed with a signup code until the email is proven.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SignupPayload {
    pub(crate) display_name: String,
    pub(crate) password_hash: String,
}

/// Payload stashed with a change-email code; pins the requesting user so no
/// other session can consume it.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChangeEmailPayload {
    pub(crate) user_id: Uuid,
}

#[derive(Debug)]
pub(crate) enum RequestCodeOutcome {
    Issued(i32),
    RateLimited,
    GenerationTimeout,
}

/// Issue a fresh code for `email`, superseding any previous one.
///
/// Runs inside the caller's transaction so the code row and its outbox row
/// commit together. Fails closed on the per-email cooldown; a concurrent
/// writer losing the race on the email constraint is reported as
/// `RateLimited` as well. Code generation retries collisions until the
/// configured deadline, then gives up with `GenerationTimeout` (the code
/// space is small, an unbounded loop would be a denial-of-service risk).
pub(crate) async fn request_code(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    operation: OtpOperation,
    payload: &serde_json::Value,
    config: &AuthConfig,
) -> Result<RequestCodeOutcome> {
    if cooldown_active(tx, email, config.otp_cooldown_seconds()).await? {
        return Ok(RequestCodeOutcome::RateLimited);
    }

    // Supersede: never two live codes for one email.
    let query = "DELETE FROM one_time_codes WHERE email = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to supersede one-time code")?;

    let payload_text =
        serde_json::to_string(payload).context("failed to serialize one-time code payload")?;

    let query = r"
        INSERT INTO one_time_codes (code, email, operation, payload_json, expires_at)
        VALUES ($1, $2, $3, $4::jsonb, NOW() + ($5 * INTERVAL '1 second'))
    ";
    let started = Instant::now();
    loop {
        if started.elapsed() > config.otp_generation_deadline() {
            return Ok(RequestCodeOutcome::GenerationTimeout);
        }

        let code = generate_code();
        // Each attempt runs in a savepoint so a collision does not poison
        // the surrounding transaction.
        let mut attempt = tx
            .begin()
            .await
            .context("failed to open code insert savepoint")?;
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(code)
            .bind(email)
            .bind(operation.as_str())
            .bind(&payload_text)
            .bind(config.otp_ttl_seconds())
            .execute(&mut *attempt)
            .instrument(span)
            .await;

        match result {
            Ok(_) => {
                attempt
                    .commit()
                    .await
                    .context("failed to release code insert savepoint")?;
                return Ok(RequestCodeOutcome::Issued(code));
            }
            Err(err) => {
                let constraint = unique_violation_constraint(&err);
                attempt
                    .rollback()
                    .await
                    .context("failed to roll back code insert savepoint")?;
                match constraint.as_deref() {
                    Some(CODE_CONSTRAINT) => {} // collision, roll a new code
                    Some(EMAIL_CONSTRAINT) => return Ok(RequestCodeOutcome::RateLimited),
                    _ => return Err(err).context("failed to insert one-time code"),
                }
            }
        }
    }
}

/// Consume a code: one conditional delete checks code, email, operation and
/// expiry, so concurrent consumers get exactly one success.
///
/// Returns the stashed payload, or `None` when nothing matched. Callers
/// cannot tell an unknown code from an expired one, a wrong email, or a
/// wrong operation.
pub(crate) async fn consume_code(
    pool: &PgPool,
    code: i32,
    email: &str,
    expected_operation: OtpOperation,
) -> Result<Option<serde_json::Value>> {
    let query = r"
        DELETE FROM one_time_codes
        WHERE code = $1
          AND email = $2
          AND operation = $3
          AND expires_at > NOW()
        RETURNING payload_json::text AS payload_json
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(code)
        .bind(email)
        .bind(expected_operation.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume one-time code")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let payload_text: String = row.get("payload_json");
    let payload =
        serde_json::from_str(&payload_text).context("failed to parse one-time code payload")?;
    Ok(Some(payload))
}

async fn cooldown_active(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    cooldown_seconds: i64,
) -> Result<bool> {
    let query = r"
        SELECT 1
        FROM one_time_codes
        WHERE email = $1
          AND issued_at > NOW() - ($2 * INTERVAL '1 second')
        LIMIT 1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(cooldown_seconds)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check one-time code cooldown")?;
    Ok(row.is_some())
}

/// Periodically delete expired codes and sessions.
///
/// The expiry predicates in `consume_code` and `lookup_session` are the
/// authoritative guards; this sweep only keeps the tables from growing.
pub(crate) fn spawn_expiry_sweep(
    pool: PgPool,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = sweep_expired(&pool).await {
                error!("expiry sweep failed: {err}");
            }
            tokio::time::sleep(interval).await;
        }
    })
}

async fn sweep_expired(pool: &PgPool) -> Result<()> {
    sqlx::query("DELETE FROM one_time_codes WHERE expires_at <= NOW()")
        .execute(pool)
        .await
        .context("failed to sweep expired one-time codes")?;
    sqlx::query("DELETE FROM user_sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await
        .context("failed to sweep expired sessions")?;
    Ok(())
}

fn generate_code() -> i32 {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert!((CODE_MIN..=CODE_MAX).contains(&code));
        }
    }

    #[test]
    fn operation_tags_are_stable() {
        assert_eq!(OtpOperation::Signup.as_str(), "signup");
        assert_eq!(OtpOperation::ChangeEmail.as_str(), "change_email");
        assert_eq!(OtpOperation::ForgotPassword.as_str(), "forgot_password");
    }

    #[test]
    fn signup_payload_round_trips() {
        let payload = SignupPayload {
            display_name: "Ada Lovelace".to_string(),
            password_hash: "$argon2id$stub".to_string(),
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        let decoded: SignupPayload = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded.display_name, "Ada Lovelace");
        assert_eq!(decoded.password_hash, "$argon2id$stub");
    }

    #[test]
    fn change_email_payload_round_trips() {
        let payload = ChangeEmailPayload {
            user_id: Uuid::nil(),
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        let decoded: ChangeEmailPayload = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded.user_id, Uuid::nil());
    }

    #[test]
    fn request_code_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", RequestCodeOutcome::Issued(123_456)),
            "Issued(123456)"
        );
        assert_eq!(
            format!("{:?}", RequestCodeOutcome::RateLimited),
            "RateLimited"
        );
        assert_eq!(
            format!("{:?}", RequestCodeOutcome::GenerationTimeout),
            "GenerationTimeout"
        );
    }
}
