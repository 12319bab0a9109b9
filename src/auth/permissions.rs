use anyhow::Error;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    SubmitAchievements,
    ViewOwnAchievements,
    RaiseQueries,

    ReviewAchievements,
    RespondToQueries,
    ViewStatistics,

    ManageInstitutions,
    ManageUsers,

    DiscoverAchievements,
    ManageSavedCandidates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Admin,
    SuperAdmin,
    Recruiter,
}

static STUDENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::SubmitAchievements);
    permissions.insert(Permission::ViewOwnAchievements);
    permissions.insert(Permission::RaiseQueries);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ReviewAchievements);
    permissions.insert(Permission::RespondToQueries);
    permissions.insert(Permission::ViewStatistics);

    permissions
});

static SUPER_ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(ADMIN_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageInstitutions);
    permissions.insert(Permission::ManageUsers);

    permissions
});

static RECRUITER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::DiscoverAchievements);
    permissions.insert(Permission::ManageSavedCandidates);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Student => &STUDENT_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
            Role::SuperAdmin => &SUPER_ADMIN_PERMISSIONS,
            Role::Recruiter => &RECRUITER_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::Recruiter => "recruiter",
        }
    }

    /// Where a user of this role lands after signing in.
    pub fn landing_path(&self) -> &'static str {
        match self {
            Role::Student => "/student",
            Role::Admin => "/admin",
            Role::SuperAdmin => "/super-admin",
            Role::Recruiter => "/recruiter",
        }
    }

    pub fn can_self_register(&self) -> bool {
        !matches!(self, Role::SuperAdmin)
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            "recruiter" => Ok(Role::Recruiter),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
