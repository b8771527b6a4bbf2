//! Session registry: opaque tokens mapped to users.
//!
//! Multi-session policy: a user may hold any number of concurrent sessions.
//! Rows are created and deleted, never updated. Only token hashes are stored.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::utils::{
    generate_session_token, hash_session_token, is_foreign_key_violation, is_unique_violation,
};

/// Minimal data returned for a valid session token.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) token_hash: Vec<u8>,
}

#[derive(Debug)]
pub(crate) enum SessionCreateOutcome {
    Created(String),
    UnknownUser,
}

/// Create a session for the user and return the raw token.
///
/// The database stores only the hash; a hash collision (astronomically rare)
/// is retried a few times rather than looping forever. A user id that does
/// not resolve is a typed outcome, not an error.
pub(crate) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<SessionCreateOutcome> {
    let query = r"
        INSERT INTO user_sessions (session_hash, user_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(user_id)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(SessionCreateOutcome::Created(token)),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) if is_foreign_key_violation(&err) => {
                return Ok(SessionCreateOutcome::UnknownUser)
            }
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a token hash to its user.
///
/// The join guarantees a session whose user vanished resolves to `None`
/// instead of a dangling identity; expiry is checked here as well.
pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT users.id, users.email, users.display_name
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
          AND user_sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        token_hash: token_hash.to_vec(),
    }))
}

/// Delete one session. Idempotent; a missing row is not an error.
pub(crate) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Delete every session for a user, optionally sparing one token hash
/// (used by authenticated password change so the current tab stays in).
pub(crate) async fn delete_all_sessions(
    pool: &PgPool,
    user_id: Uuid,
    except: Option<&[u8]>,
) -> Result<()> {
    let result = match except {
        Some(spared) => {
            let query = "DELETE FROM user_sessions WHERE user_id = $1 AND session_hash != $2";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(user_id)
                .bind(spared)
                .execute(pool)
                .instrument(span)
                .await
        }
        None => {
            let query = "DELETE FROM user_sessions WHERE user_id = $1";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(user_id)
                .execute(pool)
                .instrument(span)
                .await
        }
    };

    result.context("failed to delete user sessions")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{SessionCreateOutcome, SessionRecord};
    use uuid::Uuid;

    #[test]
    fn create_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", SessionCreateOutcome::Created("tok".to_string())),
            "Created(\"tok\")"
        );
        assert_eq!(
            format!("{:?}", SessionCreateOutcome::UnknownUser),
            "UnknownUser"
        );
    }

    #[test]
    fn session_record_holds_values() {
        let record = SessionRecord {
            user_id: Uuid::nil(),
            email: "ada@example.com".to_string(),
            display_name: "Ada".to_string(),
            token_hash: vec![1, 2, 3],
        };
        assert_eq!(record.user_id, Uuid::nil());
        assert_eq!(record.email, "ada@example.com");
        assert_eq!(record.token_hash, vec![1, 2, 3]);
    }
}
