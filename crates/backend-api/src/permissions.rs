//! Role and scope checks for church-scoped operations.
//!
//! Every predicate takes the resolved [`TenantScope`] of a request. Read-only
//! scopes come from cross-tenant access links and never allow writes.

use flock_auth::UserRole;
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Full,
    ReadOnly,
}

/// The church a request runs against and how the caller reached it.
#[derive(Debug, Clone)]
pub struct TenantScope {
    pub church_id: i64,
    pub church_public_id: String,
    pub access: AccessLevel,
    pub role: UserRole,
}

impl TenantScope {
    pub fn is_read_only(&self) -> bool {
        self.access == AccessLevel::ReadOnly
    }

    fn is_own_admin(&self) -> bool {
        self.access == AccessLevel::Full && self.role == UserRole::Admin
    }
}

pub fn can_view(_scope: &TenantScope) -> bool {
    true
}

/// Members, attendance, guests, new believers and head counts.
pub fn can_edit_records(scope: &TenantScope) -> bool {
    scope.access == AccessLevel::Full && matches!(scope.role, UserRole::Admin | UserRole::Leader)
}

pub fn can_delete_member_directly(scope: &TenantScope) -> bool {
    scope.is_own_admin()
}

pub fn can_request_member_deletion(scope: &TenantScope) -> bool {
    can_edit_records(scope)
}

pub fn can_manage_bacentas(scope: &TenantScope) -> bool {
    scope.is_own_admin()
}

pub fn can_invite(scope: &TenantScope) -> bool {
    scope.is_own_admin()
}

pub fn can_review_deletions(scope: &TenantScope) -> bool {
    scope.is_own_admin()
}

pub fn can_manage_church(scope: &TenantScope) -> bool {
    scope.is_own_admin()
}

/// Turn a failed predicate into a 403 carrying `message`.
pub fn ensure(allowed: bool, message: &str) -> Result<(), ServiceError> {
    if allowed {
        Ok(())
    } else {
        Err(ServiceError::forbidden(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(access: AccessLevel, role: UserRole) -> TenantScope {
        TenantScope {
            church_id: 1,
            church_public_id: "church".into(),
            access,
            role,
        }
    }

    type Predicate = fn(&TenantScope) -> bool;

    const WRITE_PREDICATES: [Predicate; 7] = [
        can_edit_records,
        can_delete_member_directly,
        can_request_member_deletion,
        can_manage_bacentas,
        can_invite,
        can_review_deletions,
        can_manage_church,
    ];

    #[test]
    fn admin_in_own_church_can_do_everything() {
        let admin = scope(AccessLevel::Full, UserRole::Admin);
        assert!(can_view(&admin));
        assert!(WRITE_PREDICATES.iter().all(|predicate| predicate(&admin)));
    }

    #[test]
    fn leader_edits_records_but_not_church_configuration() {
        let leader = scope(AccessLevel::Full, UserRole::Leader);
        assert!(can_view(&leader));
        assert!(can_edit_records(&leader));
        assert!(can_request_member_deletion(&leader));
        assert!(!can_delete_member_directly(&leader));
        assert!(!can_manage_bacentas(&leader));
        assert!(!can_invite(&leader));
        assert!(!can_review_deletions(&leader));
        assert!(!can_manage_church(&leader));
    }

    #[test]
    fn read_only_scope_never_writes() {
        for role in [UserRole::Admin, UserRole::Leader] {
            let viewer = scope(AccessLevel::ReadOnly, role);
            assert!(can_view(&viewer));
            assert!(viewer.is_read_only());
            assert!(
                WRITE_PREDICATES.iter().all(|predicate| !predicate(&viewer)),
                "read-only {role:?} scope must not write"
            );
        }
    }

    #[test]
    fn ensure_maps_denial_to_forbidden() {
        assert!(ensure(true, "nope").is_ok());
        let err = ensure(false, "Only admins can manage bacentas").unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(msg) if msg.contains("admins")));
    }
}
