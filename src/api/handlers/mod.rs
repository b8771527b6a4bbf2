pub mod auth;
pub mod health;
pub mod me;
pub mod todos;

pub mod root {
    use axum::response::IntoResponse;

    /// Undocumented root route; points humans at the API docs.
    pub async fn root() -> impl IntoResponse {
        concat!(env!("CARGO_PKG_NAME"), " - see /docs")
    }
}
