//! Authentication core: credential store, OTP ledger, session registry, and
//! the flow handlers composing them.

pub mod email_change;
pub mod error;
pub mod login;
pub mod principal;
pub mod recovery;
pub mod session;
pub mod signup;
pub mod state;
pub mod types;

pub(crate) mod otp;
pub(crate) mod password;
pub(crate) mod sessions;
pub(crate) mod users;
pub(crate) mod utils;

pub use state::{AuthConfig, AuthState};
