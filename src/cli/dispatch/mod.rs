//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let frontend_base_url = matches
        .get_one::<String>("frontend-base-url")
        .cloned()
        .context("missing required argument: --frontend-base-url")?;

    let get_i64 = |name: &str| matches.get_one::<i64>(name).copied().unwrap_or_default();
    let get_u64 = |name: &str| matches.get_one::<u64>(name).copied().unwrap_or_default();

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url,
        otp_ttl_seconds: get_i64("otp-ttl-seconds"),
        otp_cooldown_seconds: get_i64("otp-cooldown-seconds"),
        otp_generation_deadline_seconds: get_u64("otp-generation-deadline-seconds"),
        session_ttl_seconds: get_i64("session-ttl-seconds"),
        sweep_interval_seconds: get_u64("sweep-interval-seconds"),
        email_outbox_poll_seconds: get_u64("email-outbox-poll-seconds"),
        email_outbox_batch_size: matches
            .get_one::<usize>("email-outbox-batch-size")
            .copied()
            .unwrap_or(10),
        email_outbox_max_attempts: matches
            .get_one::<u32>("email-outbox-max-attempts")
            .copied()
            .unwrap_or(5),
        email_outbox_backoff_base_seconds: get_u64("email-outbox-backoff-base-seconds"),
        email_outbox_backoff_max_seconds: get_u64("email-outbox-backoff-max-seconds"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn dsn_required() {
        temp_env::with_vars([("PRIORLY_DSN", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let result = command.try_get_matches_from(vec!["priorly"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn maps_auth_defaults() {
        temp_env::with_vars(
            [
                ("PRIORLY_DSN", Some("postgres://localhost/priorly")),
                ("PRIORLY_PORT", None),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["priorly"]);
                let action = handler(&matches).expect("server action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.otp_ttl_seconds, 600);
                assert_eq!(args.otp_cooldown_seconds, 60);
                assert_eq!(args.otp_generation_deadline_seconds, 30);
                assert_eq!(args.session_ttl_seconds, 259_200);
            },
        );
    }
}
