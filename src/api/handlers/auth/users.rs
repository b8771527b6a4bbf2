//! Credential store: user rows and their lifecycle.
//!
//! Password hashing happens in the orchestrator through `password.rs`; this
//! module only ever sees hashes. Account deletion cascades explicitly so no
//! orphaned session or to-do survives a completed delete.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::utils::is_unique_violation;

#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) display_name: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

#[derive(Debug)]
pub(crate) enum CreateUserOutcome {
    Created(UserRecord),
    DuplicateEmail,
}

#[derive(Debug)]
pub(crate) enum UpdateEmailOutcome {
    Updated,
    DuplicateEmail,
}

const USER_COLUMNS: &str =
    "id, email, password_hash, display_name, created_at::text AS created_at, \
     updated_at::text AS updated_at";

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(crate) async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    display_name: &str,
) -> Result<CreateUserOutcome> {
    let query = format!(
        "INSERT INTO users (email, password_hash, display_name) \
         VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(pool)
        .await;

    match row {
        Ok(row) => Ok(CreateUserOutcome::Created(user_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::DuplicateEmail),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub(crate) async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn email_taken(pool: &PgPool, email: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM users WHERE email = $1 LIMIT 1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("failed to check email availability")?;
    Ok(row.is_some())
}

pub(crate) async fn update_password(pool: &PgPool, id: Uuid, new_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(new_hash)
        .execute(pool)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

pub(crate) async fn update_email(
    pool: &PgPool,
    id: Uuid,
    new_email: &str,
) -> Result<UpdateEmailOutcome> {
    let result = sqlx::query("UPDATE users SET email = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(new_email)
        .execute(pool)
        .await;

    match result {
        Ok(_) => Ok(UpdateEmailOutcome::Updated),
        Err(err) if is_unique_violation(&err) => Ok(UpdateEmailOutcome::DuplicateEmail),
        Err(err) => Err(err).context("failed to update email"),
    }
}

pub(crate) async fn update_display_name(pool: &PgPool, id: Uuid, name: &str) -> Result<()> {
    sqlx::query("UPDATE users SET display_name = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .context("failed to update display name")?;
    Ok(())
}

/// Delete a user and everything they own.
///
/// One transaction: to-dos, sessions, then the user row, so a completed
/// delete leaves nothing resolvable behind.
pub(crate) async fn delete_user(pool: &PgPool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("begin delete-user transaction")?;

    sqlx::query("DELETE FROM todos WHERE user_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete user todos")?;

    sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete user sessions")?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete user")?;

    tx.commit().await.context("commit delete-user transaction")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CreateUserOutcome, UpdateEmailOutcome, UserRecord};
    use uuid::Uuid;

    #[test]
    fn outcome_debug_names() {
        assert_eq!(
            format!("{:?}", CreateUserOutcome::DuplicateEmail),
            "DuplicateEmail"
        );
        assert_eq!(format!("{:?}", UpdateEmailOutcome::Updated), "Updated");
    }

    #[test]
    fn user_record_holds_values() {
        let record = UserRecord {
            id: Uuid::nil(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            display_name: "Ada".to_string(),
            created_at: "2026-01-01 00:00:00+00".to_string(),
            updated_at: "2026-01-01 00:00:00+00".to_string(),
        };
        assert_eq!(record.id, Uuid::nil());
        assert_eq!(record.email, "ada@example.com");
        assert_eq!(record.display_name, "Ada");
    }
}
