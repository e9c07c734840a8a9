//! Composable access gates.
//!
//! Each gate decides before `op` runs; a rejected call has no side effects.

use crate::access::session::{AuthenticatedUser, Session};
use crate::access::AccessError;
use crate::model::role::Role;

/// Runs `op` only for an authenticated session.
pub fn require_authentication<T, E>(
    session: &Session,
    op: impl FnOnce(&AuthenticatedUser) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<AccessError>,
{
    let user = session.user().ok_or(AccessError::Unauthorized)?;
    op(user)
}

/// Runs `op` only for an authenticated session whose role is in `roles`.
///
/// No session gives `Unauthorized`; a session with another role gives
/// `Forbidden`.
pub fn require_role<T, E>(
    session: &Session,
    roles: &[Role],
    op: impl FnOnce(&AuthenticatedUser) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<AccessError>,
{
    require_authentication(session, |user| {
        if !roles.contains(&user.role) {
            return Err(AccessError::Forbidden {
                role: user.role,
                required: roles.to_vec(),
            }
            .into());
        }
        op(user)
    })
}

#[cfg(test)]
mod tests {
    use super::{require_authentication, require_role};
    use crate::access::session::Session;
    use crate::access::AccessError;
    use crate::model::role::Role;
    use std::cell::Cell;

    #[test]
    fn anonymous_session_never_runs_the_operation() {
        let ran = Cell::new(false);
        let result: Result<(), AccessError> = require_authentication(&Session::anonymous(), |_| {
            ran.set(true);
            Ok(())
        });

        assert!(matches!(result, Err(AccessError::Unauthorized)));
        assert!(!ran.get());
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let viewer = Session::authenticated("viewer1", "Viewer", Role::Viewer);
        let result: Result<(), AccessError> = require_role(&viewer, &[Role::Admin], |_| Ok(()));
        assert!(matches!(
            result,
            Err(AccessError::Forbidden {
                role: Role::Viewer,
                ..
            })
        ));

        let anonymous: Result<(), AccessError> =
            require_role(&Session::anonymous(), &[Role::Admin], |_| Ok(()));
        assert!(matches!(anonymous, Err(AccessError::Unauthorized)));
    }

    #[test]
    fn matching_role_passes_identity_through() {
        let admin = Session::authenticated("admin", "Administrator", Role::Admin);
        let identity: Result<String, AccessError> =
            require_role(&admin, &[Role::Admin], |user| Ok(user.identity.clone()));
        assert_eq!(identity.expect("admin allowed"), "admin");
    }
}
