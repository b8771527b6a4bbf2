use crate::{
    api,
    api::{email::EmailWorkerConfig, handlers::auth::AuthConfig},
    cli::actions::Action,
};
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub otp_ttl_seconds: i64,
    pub otp_cooldown_seconds: i64,
    pub otp_generation_deadline_seconds: u64,
    pub session_ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database pool cannot be built or the server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server(args) = action;

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_otp_cooldown_seconds(args.otp_cooldown_seconds)
        .with_otp_generation_deadline_seconds(args.otp_generation_deadline_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_sweep_interval_seconds(args.sweep_interval_seconds);

    let email_config = EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, auth_config, email_config).await
}
