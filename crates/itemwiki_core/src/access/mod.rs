//! Access control: sessions, role gates, rate limiting and credentials.
//!
//! # Responsibility
//! - Model the Anonymous/Authenticated session lifecycle as a value.
//! - Gate operations on authentication and role before they run.
//! - Throttle per-session request rates for named actions.
//!
//! # Invariants
//! - A rejected operation never executes and has no side effects.
//! - `Unauthorized` means no identity; `Forbidden` means the wrong role.

use crate::model::role::Role;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod credentials;
pub mod guard;
pub mod rate_limit;
pub mod session;

pub use credentials::{
    AuthProvider, CredentialError, CredentialResult, CredentialStore, LoginStatus, NewUser,
    UserSummary,
};
pub use guard::{require_authentication, require_role};
pub use rate_limit::{RateLimit, RateLimiter};
pub use session::{AuthenticatedUser, Principal, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    Unauthorized,
    Forbidden { role: Role, required: Vec<Role> },
    RateLimited { action: String, retry_after_secs: u64 },
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "authentication required"),
            Self::Forbidden { role, required } => {
                let required = required
                    .iter()
                    .map(|role| role.as_str())
                    .collect::<Vec<_>>()
                    .join("|");
                write!(f, "role `{}` is not allowed; requires {required}", role.as_str())
            }
            Self::RateLimited {
                action,
                retry_after_secs,
            } => write!(
                f,
                "too many `{action}` requests; retry in {retry_after_secs}s"
            ),
        }
    }
}

impl Error for AccessError {}
