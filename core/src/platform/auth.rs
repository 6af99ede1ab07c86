use super::error::{PlatformError, PlatformResult};
use super::membership::Membership;
use super::models::AccountId;
use fleetcommon::auth::{Role, RoleSet};

/// Role predicates over the registry's membership sets, and the guards the
/// entry points run before anything is dispatched.
#[derive(Clone)]
pub struct AuthorizationGate {
    membership: Membership,
}

impl AuthorizationGate {
    pub fn new(membership: Membership) -> Self {
        Self { membership }
    }

    pub fn is_owner(&self, caller: &AccountId) -> PlatformResult<bool> {
        self.membership.has_owner(caller)
    }

    pub fn is_contributor(&self, caller: &AccountId) -> PlatformResult<bool> {
        self.membership.is_contributor(caller)
    }

    pub fn is_contributor_or_owner(&self, caller: &AccountId) -> PlatformResult<bool> {
        Ok(self.is_owner(caller)? || self.is_contributor(caller)?)
    }

    pub fn role_of(&self, account: &AccountId) -> PlatformResult<RoleSet> {
        let mut roles = RoleSet::none();
        if self.is_owner(account)? {
            roles = roles.with(Role::Owner);
        }
        if self.is_contributor(account)? {
            roles = roles.with(Role::Contributor);
        }
        Ok(roles)
    }

    pub fn require_owner(&self, caller: &AccountId) -> PlatformResult<()> {
        if self.is_owner(caller)? {
            Ok(())
        } else {
            tracing::debug!(%caller, "owner role required");
            Err(PlatformError::Unauthorized)
        }
    }

    pub fn require_contributor_or_owner(&self, caller: &AccountId) -> PlatformResult<()> {
        if self.is_contributor_or_owner(caller)? {
            Ok(())
        } else {
            tracing::debug!(%caller, "contributor or owner role required");
            Err(PlatformError::Unauthorized)
        }
    }
}
