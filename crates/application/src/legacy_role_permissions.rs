use std::collections::BTreeSet;

use taskgate_core::LegacyRole;
use taskgate_domain::{Permission, SystemRole};

/// Translates the legacy coarse role into catalog permissions at evaluation time.
pub trait LegacyRolePermissions: Send + Sync {
    /// Returns the permissions implied by a legacy role.
    fn permissions_for(&self, legacy_role: LegacyRole) -> BTreeSet<Permission>;
}

/// Maps each legacy role onto the built-in defaults of the system role of the same name.
///
/// The defaults are fixed: editing the stored `employee` or `customer` role changes
/// what its explicit assignees hold, not what legacy-only users resolve to.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRoleLegacyMapping;

impl LegacyRolePermissions for SystemRoleLegacyMapping {
    fn permissions_for(&self, legacy_role: LegacyRole) -> BTreeSet<Permission> {
        match legacy_role {
            LegacyRole::Employee => SystemRole::Employee.permissions(),
            LegacyRole::Customer => SystemRole::Customer.permissions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use taskgate_core::LegacyRole;
    use taskgate_domain::{Permission, SystemRole};

    use super::{LegacyRolePermissions, SystemRoleLegacyMapping};

    #[test]
    fn both_legacy_roles_resolve_non_empty_sets() {
        let mapping = SystemRoleLegacyMapping;
        assert!(!mapping.permissions_for(LegacyRole::Employee).is_empty());
        assert!(!mapping.permissions_for(LegacyRole::Customer).is_empty());
    }

    #[test]
    fn customers_submit_and_employees_complete() {
        let mapping = SystemRoleLegacyMapping;
        let customer = mapping.permissions_for(LegacyRole::Customer);
        let employee = mapping.permissions_for(LegacyRole::Employee);

        assert!(customer.contains(&Permission::SubmitTask));
        assert!(!customer.contains(&Permission::CompleteTask));
        assert!(employee.contains(&Permission::CompleteTask));
        assert!(!employee.contains(&Permission::SubmitTask));
    }

    #[test]
    fn legacy_roles_resolve_to_the_built_in_system_role_defaults() {
        let mapping = SystemRoleLegacyMapping;
        assert_eq!(
            mapping.permissions_for(LegacyRole::Employee),
            SystemRole::Employee.permissions()
        );
        assert_eq!(
            mapping.permissions_for(LegacyRole::Customer),
            SystemRole::Customer.permissions()
        );
    }
}
