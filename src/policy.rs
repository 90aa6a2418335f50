//! Role-based access decisions and the visibility scope derived from a
//! principal. Decisions are pure functions of role and department
//! memberships; persistence code applies [`Scope`] as a query predicate and
//! never re-implements these rules.

use uuid::Uuid;

use crate::auth::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Clerk,
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Clerk => "CLERK",
            Role::Staff => "STAFF",
        }
    }

    /// Unknown role strings yield `None`; callers treat the bearer as
    /// unauthenticated rather than guessing at a permission set.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "CLERK" => Some(Role::Clerk),
            "STAFF" => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn permits(self, action: Action) -> bool {
        match self {
            Role::Admin => true,
            Role::Clerk => !matches!(action, Action::Delete),
            Role::Staff => matches!(action, Action::Read),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

/// Which documents a principal may read.
///
/// `Departments` with an empty set is a valid state (a staff member with no
/// memberships) and matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Departments(Vec<Uuid>),
}

pub fn visibility_scope(principal: &Principal) -> Scope {
    match principal.role {
        Role::Admin | Role::Clerk => Scope::All,
        Role::Staff => Scope::Departments(principal.department_ids.clone()),
    }
}

pub fn authorize(principal: &Principal, action: Action) -> Result<(), crate::error::AppError> {
    if principal.role.permits(action) {
        Ok(())
    } else {
        Err(crate::error::AppError::Forbidden)
    }
}
