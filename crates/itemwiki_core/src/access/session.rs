//! Explicit per-client session state.

use crate::model::role::Role;
use uuid::Uuid;

/// Identity attached to a session after a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub identity: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Authenticated(AuthenticatedUser),
}

/// Session value threaded through every access check.
///
/// The session id is stable across login and logout so rate-limit windows
/// follow the client rather than the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    principal: Principal,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            principal: Principal::Anonymous,
        }
    }

    pub fn authenticated(
        identity: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self::anonymous().login_as(AuthenticatedUser {
            identity: identity.into(),
            display_name: display_name.into(),
            role,
        })
    }

    /// Anonymous -> Authenticated, keeping the session id.
    pub fn login_as(self, user: AuthenticatedUser) -> Self {
        Self {
            id: self.id,
            principal: Principal::Authenticated(user),
        }
    }

    /// Authenticated -> Anonymous, keeping the session id.
    pub fn logout(self) -> Self {
        Self {
            id: self.id,
            principal: Principal::Anonymous,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match &self.principal {
            Principal::Authenticated(user) => Some(user),
            Principal::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.user().map(|user| user.role)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}
