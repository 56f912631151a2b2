//! Claim registry - the closed set of permission identifiers and the roles
//! that receive them by default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Permission identifier. Stored and cached by its `as_str` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    TenantCreate,
    TenantRead,
    TenantUpdate,
    TenantDelete,
    UserCreate,
    UserRead,
    UserUpdate,
    UserDelete,
    PatientCreate,
    PatientRead,
    PatientUpdate,
    PatientDelete,
    InventoryCreate,
    InventoryRead,
    InventoryUpdate,
    InventoryDelete,
    RoleManage,
    AuditRead,
}

impl Permission {
    pub const ALL: [Permission; 18] = [
        Permission::TenantCreate,
        Permission::TenantRead,
        Permission::TenantUpdate,
        Permission::TenantDelete,
        Permission::UserCreate,
        Permission::UserRead,
        Permission::UserUpdate,
        Permission::UserDelete,
        Permission::PatientCreate,
        Permission::PatientRead,
        Permission::PatientUpdate,
        Permission::PatientDelete,
        Permission::InventoryCreate,
        Permission::InventoryRead,
        Permission::InventoryUpdate,
        Permission::InventoryDelete,
        Permission::RoleManage,
        Permission::AuditRead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::TenantCreate => "tenant_create",
            Permission::TenantRead => "tenant_read",
            Permission::TenantUpdate => "tenant_update",
            Permission::TenantDelete => "tenant_delete",
            Permission::UserCreate => "user_create",
            Permission::UserRead => "user_read",
            Permission::UserUpdate => "user_update",
            Permission::UserDelete => "user_delete",
            Permission::PatientCreate => "patient_create",
            Permission::PatientRead => "patient_read",
            Permission::PatientUpdate => "patient_update",
            Permission::PatientDelete => "patient_delete",
            Permission::InventoryCreate => "inventory_create",
            Permission::InventoryRead => "inventory_read",
            Permission::InventoryUpdate => "inventory_update",
            Permission::InventoryDelete => "inventory_delete",
            Permission::RoleManage => "role_manage",
            Permission::AuditRead => "audit_read",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}

/// Named bundle of permissions assigned to principals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Staff,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Manager, Role::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
        }
    }

    /// Permissions a role is seeded with when it has no assignments yet.
    pub fn default_claims(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::SuperAdmin => &Permission::ALL,
            Role::Admin => &[
                TenantRead,
                TenantUpdate,
                UserCreate,
                UserRead,
                UserUpdate,
                UserDelete,
                PatientCreate,
                PatientRead,
                PatientUpdate,
                PatientDelete,
                InventoryCreate,
                InventoryRead,
                InventoryUpdate,
                InventoryDelete,
                RoleManage,
                AuditRead,
            ],
            Role::Manager => &[
                UserRead,
                PatientCreate,
                PatientRead,
                PatientUpdate,
                InventoryCreate,
                InventoryRead,
                InventoryUpdate,
            ],
            Role::Staff => &[PatientRead, PatientUpdate, InventoryRead],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "staff" => Ok(Role::Staff),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_identifiers_round_trip() {
        for permission in Permission::ALL {
            assert_eq!(permission.as_str().parse::<Permission>(), Ok(permission));
        }
        assert!("tenant_explode".parse::<Permission>().is_err());
    }

    #[test]
    fn super_admin_holds_every_permission() {
        assert_eq!(Role::SuperAdmin.default_claims().len(), Permission::ALL.len());
    }

    #[test]
    fn only_super_admin_creates_tenants_by_default() {
        for role in Role::ALL {
            let can_create = role.default_claims().contains(&Permission::TenantCreate);
            assert_eq!(can_create, role == Role::SuperAdmin, "role {}", role);
        }
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("SUPER_ADMIN".parse::<Role>(), Ok(Role::SuperAdmin));
        assert!("root".parse::<Role>().is_err());
    }
}
