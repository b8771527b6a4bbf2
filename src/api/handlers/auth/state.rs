//! Auth configuration and shared state.

use std::time::Duration;

const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_OTP_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_OTP_GENERATION_DEADLINE_SECONDS: u64 = 30;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 3 * 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    otp_ttl_seconds: i64,
    otp_cooldown_seconds: i64,
    otp_generation_deadline_seconds: u64,
    session_ttl_seconds: i64,
    sweep_interval_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_cooldown_seconds: DEFAULT_OTP_COOLDOWN_SECONDS,
            otp_generation_deadline_seconds: DEFAULT_OTP_GENERATION_DEADLINE_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.otp_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_generation_deadline_seconds(mut self, seconds: u64) -> Self {
        self.otp_generation_deadline_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(crate) fn otp_cooldown_seconds(&self) -> i64 {
        self.otp_cooldown_seconds
    }

    pub(crate) fn otp_generation_deadline(&self) -> Duration {
        Duration::from_secs(self.otp_generation_deadline_seconds)
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared auth state handed to handlers as an extension.
pub struct AuthState {
    config: AuthConfig,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
