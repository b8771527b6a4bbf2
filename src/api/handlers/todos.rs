//! Per-user to-do CRUD.
//!
//! Every endpoint resolves the session first; id-addressed operations check
//! ownership. Done/deleted state carries a timestamp, and toggling either
//! flag must be the only change in its request.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::error;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::auth::error::ApiError;
use super::auth::principal::require_auth;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TodoCreateRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub deadline: Option<i64>,
    pub reminder: Option<i64>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_important: bool,
    #[serde(default)]
    pub is_urgent: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TodoUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<Option<i64>>,
    pub reminder: Option<Option<i64>>,
    pub priority: Option<i32>,
    pub is_important: Option<bool>,
    pub is_urgent: Option<bool>,
    pub is_done: Option<bool>,
    pub is_deleted: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TodoListParams {
    pub done: Option<bool>,
    pub deleted: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TodoResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub deadline: Option<i64>,
    pub reminder: Option<i64>,
    pub is_done: bool,
    pub completed_on: Option<i64>,
    pub is_deleted: bool,
    pub deleted_on: Option<i64>,
    pub priority: i32,
    pub is_important: bool,
    pub is_urgent: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TodoCountResponse {
    pub count: i64,
}

struct TodoRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    description: String,
    deadline: Option<i64>,
    reminder: Option<i64>,
    is_done: bool,
    completed_on: Option<i64>,
    is_deleted: bool,
    deleted_on: Option<i64>,
    priority: i32,
    is_important: bool,
    is_urgent: bool,
    created_at: String,
    updated_at: String,
}

const TODO_COLUMNS: &str =
    "id, user_id, title, description, deadline, reminder, is_done, completed_on, \
     is_deleted, deleted_on, priority, is_important, is_urgent, \
     created_at::text AS created_at, updated_at::text AS updated_at";

fn todo_from_row(row: &sqlx::postgres::PgRow) -> TodoRecord {
    TodoRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        description: row.get("description"),
        deadline: row.get("deadline"),
        reminder: row.get("reminder"),
        is_done: row.get("is_done"),
        completed_on: row.get("completed_on"),
        is_deleted: row.get("is_deleted"),
        deleted_on: row.get("deleted_on"),
        priority: row.get("priority"),
        is_important: row.get("is_important"),
        is_urgent: row.get("is_urgent"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl From<TodoRecord> for TodoResponse {
    fn from(record: TodoRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title,
            description: record.description,
            deadline: record.deadline,
            reminder: record.reminder,
            is_done: record.is_done,
            completed_on: record.completed_on,
            is_deleted: record.is_deleted,
            deleted_on: record.deleted_on,
            priority: record.priority,
            is_important: record.is_important,
            is_urgent: record.is_urgent,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/todos",
    request_body = TodoCreateRequest,
    responses(
        (status = 201, description = "Todo created", body = TodoResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Missing or invalid session cookie")
    ),
    tag = "todos"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<TodoCreateRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Some(Json(request)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let title = request.title.trim();
    if title.is_empty() {
        return ApiError::validation("Title is required").into_response();
    }

    match insert_todo(&pool, principal.user_id, title, &request).await {
        Ok(record) => {
            (StatusCode::CREATED, Json(TodoResponse::from(record))).into_response()
        }
        Err(err) => {
            error!("Failed to create todo: {err}");
            ApiError::Internal.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/todos/{id}",
    params(("id" = String, Path, description = "Todo id")),
    responses(
        (status = 200, description = "Todo details", body = TodoResponse),
        (status = 401, description = "Missing or invalid session cookie"),
        (status = 403, description = "Todo belongs to another user"),
        (status = 404, description = "Todo does not exist")
    ),
    tag = "todos"
)]
pub async fn details(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match owned_todo(&pool, &id, principal.user_id).await {
        Ok(record) => (StatusCode::OK, Json(TodoResponse::from(record))).into_response(),
        Err(error) => error.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/todos",
    params(TodoListParams),
    responses(
        (status = 200, description = "Todos for the authenticated user", body = [TodoResponse]),
        (status = 401, description = "Missing or invalid session cookie")
    ),
    tag = "todos"
)]
pub async fn list(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(params): Query<TodoListParams>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let query = format!(
        "SELECT {TODO_COLUMNS} FROM todos \
         WHERE user_id = $1 \
           AND ($2::boolean IS NULL OR is_done = $2) \
           AND ($3::boolean IS NULL OR is_deleted = $3) \
         ORDER BY created_at DESC"
    );
    let rows = sqlx::query(&query)
        .bind(principal.user_id)
        .bind(params.done)
        .bind(params.deleted)
        .fetch_all(&pool.0)
        .await;

    match rows {
        Ok(rows) => {
            let todos: Vec<TodoResponse> = rows
                .iter()
                .map(|row| TodoResponse::from(todo_from_row(row)))
                .collect();
            (StatusCode::OK, Json(todos)).into_response()
        }
        Err(err) => {
            error!("Failed to list todos: {err}");
            ApiError::Internal.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/todos/count",
    params(TodoListParams),
    responses(
        (status = 200, description = "Todo count for the authenticated user", body = TodoCountResponse),
        (status = 401, description = "Missing or invalid session cookie")
    ),
    tag = "todos"
)]
pub async fn count(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Query(params): Query<TodoListParams>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM todos \
         WHERE user_id = $1 \
           AND ($2::boolean IS NULL OR is_done = $2) \
           AND ($3::boolean IS NULL OR is_deleted = $3)",
    )
    .bind(principal.user_id)
    .bind(params.done)
    .bind(params.deleted)
    .fetch_one(&pool.0)
    .await;

    match row {
        Ok(row) => {
            let count: i64 = row.get("count");
            (StatusCode::OK, Json(TodoCountResponse { count })).into_response()
        }
        Err(err) => {
            error!("Failed to count todos: {err}");
            ApiError::Internal.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/todos/{id}",
    params(("id" = String, Path, description = "Todo id")),
    request_body = TodoUpdateRequest,
    responses(
        (status = 200, description = "Todo updated", body = TodoResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Missing or invalid session cookie"),
        (status = 403, description = "Todo belongs to another user"),
        (status = 404, description = "Todo does not exist")
    ),
    tag = "todos"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<String>,
    payload: Option<Json<TodoUpdateRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let Some(Json(changes)) = payload else {
        return ApiError::validation("Missing payload").into_response();
    };

    let record = match owned_todo(&pool, &id, principal.user_id).await {
        Ok(record) => record,
        Err(error) => return error.into_response(),
    };

    if let Err(error) = check_update_rules(&record, &changes) {
        return error.into_response();
    }

    let result = if let Some(done) = changes.is_done {
        set_done(&pool, record.id, done).await
    } else if let Some(deleted) = changes.is_deleted {
        set_deleted(&pool, record.id, deleted).await
    } else {
        apply_field_edits(&pool, &record, &changes).await
    };

    match result {
        Ok(record) => (StatusCode::OK, Json(TodoResponse::from(record))).into_response(),
        Err(err) => {
            error!("Failed to update todo: {err}");
            ApiError::Internal.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/todos/{id}",
    params(("id" = String, Path, description = "Todo id")),
    responses(
        (status = 204, description = "Todo deleted"),
        (status = 401, description = "Missing or invalid session cookie"),
        (status = 403, description = "Todo belongs to another user"),
        (status = 404, description = "Todo does not exist")
    ),
    tag = "todos"
)]
pub async fn remove(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let record = match owned_todo(&pool, &id, principal.user_id).await {
        Ok(record) => record,
        Err(error) => return error.into_response(),
    };

    let result = sqlx::query("DELETE FROM todos WHERE id = $1")
        .bind(record.id)
        .execute(&pool.0)
        .await;

    match result {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to delete todo: {err}");
            ApiError::Internal.into_response()
        }
    }
}

/// Fetch a todo and verify the caller owns it.
async fn owned_todo(pool: &PgPool, id: &str, user_id: Uuid) -> Result<TodoRecord, ApiError> {
    let Ok(todo_id) = Uuid::parse_str(id) else {
        return Err(ApiError::validation("Invalid id"));
    };

    let query = format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(todo_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| {
            error!("Failed to fetch todo: {err}");
            ApiError::Internal
        })?;

    let Some(row) = row else {
        return Err(ApiError::NotFound("Todo does not exist"));
    };
    let record = todo_from_row(&row);
    if record.user_id != user_id {
        return Err(ApiError::Forbidden(
            "You don't have permission to read or update this todo item",
        ));
    }
    Ok(record)
}

/// Enforce the edit rules around the done/deleted toggles.
fn check_update_rules(record: &TodoRecord, changes: &TodoUpdateRequest) -> Result<(), ApiError> {
    let change_count = [
        changes.title.is_some(),
        changes.description.is_some(),
        changes.deadline.is_some(),
        changes.reminder.is_some(),
        changes.priority.is_some(),
        changes.is_important.is_some(),
        changes.is_urgent.is_some(),
        changes.is_done.is_some(),
        changes.is_deleted.is_some(),
    ]
    .iter()
    .filter(|&&present| present)
    .count();

    if change_count == 0 {
        return Err(ApiError::validation("No change to update"));
    }

    if (changes.is_done.is_some() || changes.is_deleted.is_some()) && change_count > 1 {
        return Err(ApiError::validation(
            "Cannot apply more changes when toggling deleted or done",
        ));
    }

    // A soft-deleted todo accepts recovery only.
    if record.is_deleted && changes.is_deleted != Some(false) {
        return Err(ApiError::validation(
            "Cannot update a deleted todo, recover it first",
        ));
    }

    Ok(())
}

async fn insert_todo(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    request: &TodoCreateRequest,
) -> Result<TodoRecord> {
    let query = format!(
        "INSERT INTO todos \
            (user_id, title, description, deadline, reminder, priority, is_important, is_urgent) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {TODO_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(title)
        .bind(request.description.trim())
        .bind(request.deadline)
        .bind(request.reminder)
        .bind(request.priority)
        .bind(request.is_important)
        .bind(request.is_urgent)
        .fetch_one(pool)
        .await
        .context("failed to insert todo")?;
    Ok(todo_from_row(&row))
}

async fn set_done(pool: &PgPool, id: Uuid, done: bool) -> Result<TodoRecord> {
    let query = format!(
        "UPDATE todos \
         SET is_done = $2, \
             completed_on = CASE WHEN $2 THEN EXTRACT(EPOCH FROM NOW())::BIGINT END, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {TODO_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(done)
        .fetch_one(pool)
        .await
        .context("failed to toggle todo done state")?;
    Ok(todo_from_row(&row))
}

async fn set_deleted(pool: &PgPool, id: Uuid, deleted: bool) -> Result<TodoRecord> {
    let query = format!(
        "UPDATE todos \
         SET is_deleted = $2, \
             deleted_on = CASE WHEN $2 THEN EXTRACT(EPOCH FROM NOW())::BIGINT END, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {TODO_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(deleted)
        .fetch_one(pool)
        .await
        .context("failed to toggle todo deleted state")?;
    Ok(todo_from_row(&row))
}

async fn apply_field_edits(
    pool: &PgPool,
    record: &TodoRecord,
    changes: &TodoUpdateRequest,
) -> Result<TodoRecord> {
    let title = changes.title.as_deref().unwrap_or(&record.title);
    let description = changes
        .description
        .as_deref()
        .unwrap_or(&record.description);
    let deadline = changes.deadline.unwrap_or(record.deadline);
    let reminder = changes.reminder.unwrap_or(record.reminder);
    let priority = changes.priority.unwrap_or(record.priority);
    let is_important = changes.is_important.unwrap_or(record.is_important);
    let is_urgent = changes.is_urgent.unwrap_or(record.is_urgent);

    let query = format!(
        "UPDATE todos \
         SET title = $2, description = $3, deadline = $4, reminder = $5, \
             priority = $6, is_important = $7, is_urgent = $8, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {TODO_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(record.id)
        .bind(title)
        .bind(description)
        .bind(deadline)
        .bind(reminder)
        .bind(priority)
        .bind(is_important)
        .bind(is_urgent)
        .fetch_one(pool)
        .await
        .context("failed to update todo fields")?;
    Ok(todo_from_row(&row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn record(is_deleted: bool) -> TodoRecord {
        TodoRecord {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            title: "Write tests".to_string(),
            description: String::new(),
            deadline: None,
            reminder: None,
            is_done: false,
            completed_on: None,
            is_deleted,
            deleted_on: if is_deleted { Some(1) } else { None },
            priority: 0,
            is_important: false,
            is_urgent: false,
            created_at: "2026-01-01 00:00:00+00".to_string(),
            updated_at: "2026-01-01 00:00:00+00".to_string(),
        }
    }

    #[test]
    fn update_rules_reject_empty_changes() {
        let changes = TodoUpdateRequest::default();
        assert!(check_update_rules(&record(false), &changes).is_err());
    }

    #[test]
    fn update_rules_reject_toggle_with_other_changes() {
        let changes = TodoUpdateRequest {
            is_done: Some(true),
            title: Some("New title".to_string()),
            ..TodoUpdateRequest::default()
        };
        assert!(check_update_rules(&record(false), &changes).is_err());
    }

    #[test]
    fn update_rules_allow_lone_toggle() {
        let changes = TodoUpdateRequest {
            is_done: Some(true),
            ..TodoUpdateRequest::default()
        };
        assert!(check_update_rules(&record(false), &changes).is_ok());
    }

    #[test]
    fn update_rules_deleted_todo_only_recovers() {
        let edit = TodoUpdateRequest {
            title: Some("New title".to_string()),
            ..TodoUpdateRequest::default()
        };
        assert!(check_update_rules(&record(true), &edit).is_err());

        let re_delete = TodoUpdateRequest {
            is_deleted: Some(true),
            ..TodoUpdateRequest::default()
        };
        assert!(check_update_rules(&record(true), &re_delete).is_err());

        let recover = TodoUpdateRequest {
            is_deleted: Some(false),
            ..TodoUpdateRequest::default()
        };
        assert!(check_update_rules(&record(true), &recover).is_ok());
    }

    #[test]
    fn update_rules_allow_plain_edit() {
        let changes = TodoUpdateRequest {
            title: Some("New title".to_string()),
            priority: Some(2),
            ..TodoUpdateRequest::default()
        };
        assert!(check_update_rules(&record(false), &changes).is_ok());
    }

    #[tokio::test]
    async fn create_requires_session() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = create(
            HeaderMap::new(),
            Extension(pool),
            Some(Json(TodoCreateRequest {
                title: "Write tests".to_string(),
                description: String::new(),
                deadline: None,
                reminder: None,
                priority: 0,
                is_important: false,
                is_urgent: false,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
