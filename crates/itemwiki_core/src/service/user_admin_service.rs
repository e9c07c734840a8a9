//! Account administration service.
//!
//! # Invariants
//! - Account management requires the `admin` role.
//! - The acting admin can never delete their own account.
//! - Any authenticated user may change their own password.

use crate::access::credentials::{
    AuthProvider, CredentialStore, LoginStatus, NewUser, UserSummary,
};
use crate::access::rate_limit::{CREATE_USER, RESET_PASSWORD};
use crate::access::{require_authentication, require_role, RateLimiter, Session};
use crate::model::role::Role;
use crate::service::ServiceResult;
use std::sync::Arc;

const ADMIN_ONLY: &[Role] = &[Role::Admin];

pub struct UserAdminService {
    store: CredentialStore,
    limiter: Arc<RateLimiter>,
}

impl UserAdminService {
    pub fn new(store: CredentialStore) -> Self {
        Self::with_rate_limiter(store, Arc::new(RateLimiter::default()))
    }

    /// Shares one limiter with the catalog service so both count against
    /// the same session windows.
    pub fn with_rate_limiter(store: CredentialStore, limiter: Arc<RateLimiter>) -> Self {
        Self { store, limiter }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn login(&self, username: &str, password: &str) -> ServiceResult<(Session, LoginStatus)> {
        Ok(self.store.login(username, password)?)
    }

    pub fn logout(&self, session: Session) -> Session {
        self.store.logout(session)
    }

    /// Returns the generated initial password.
    pub fn create_user(&self, session: &Session, user: &NewUser) -> ServiceResult<String> {
        require_role(session, ADMIN_ONLY, |admin| {
            self.limiter.check(session.id(), CREATE_USER)?;
            Ok(self.store.create_user(user, &admin.identity)?)
        })
    }

    pub fn list_users(&self, session: &Session) -> ServiceResult<Vec<UserSummary>> {
        require_role(session, ADMIN_ONLY, |_| Ok(self.store.list_users()?))
    }

    /// Returns the generated replacement password.
    pub fn reset_password(&self, session: &Session, username: &str) -> ServiceResult<String> {
        require_role(session, ADMIN_ONLY, |_| {
            self.limiter.check(session.id(), RESET_PASSWORD)?;
            Ok(self.store.reset_password(username)?)
        })
    }

    pub fn delete_user(&self, session: &Session, username: &str) -> ServiceResult<()> {
        require_role(session, ADMIN_ONLY, |admin| {
            Ok(self.store.delete_user(username, &admin.identity)?)
        })
    }

    pub fn change_own_password(
        &self,
        session: &Session,
        current: &str,
        new: &str,
    ) -> ServiceResult<()> {
        require_authentication(session, |user| {
            Ok(self.store.change_password(&user.identity, current, new)?)
        })
    }
}
