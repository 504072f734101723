//! Permission Gate
//!
//! Maps an (optional) authenticated identity and a named capability to an
//! allow/deny decision. A deny says whether the caller was unknown or known
//! but under-privileged, since those surface differently.

use crate::auth::{Identity, Role};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Read the review queue
    View,
    Propose,
    Review,
    Administer,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::View => "view",
            Capability::Propose => "propose",
            Capability::Review => "review",
            Capability::Administer => "administer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    InsufficientRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

pub trait PermissionGate: Send + Sync {
    fn check(&self, identity: Option<&Identity>, capability: Capability) -> Decision;
}

/// Static role hierarchy: viewer < contributor < reviewer < admin
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleGate;

impl RoleGate {
    fn allows(role: Role, capability: Capability) -> bool {
        match capability {
            Capability::View => true,
            Capability::Propose => matches!(role, Role::Contributor | Role::Reviewer | Role::Admin),
            Capability::Review => matches!(role, Role::Reviewer | Role::Admin),
            Capability::Administer => matches!(role, Role::Admin),
        }
    }
}

impl PermissionGate for RoleGate {
    fn check(&self, identity: Option<&Identity>, capability: Capability) -> Decision {
        match identity {
            None => Decision::Deny(DenyReason::Unauthenticated),
            Some(identity) if Self::allows(identity.role, capability) => Decision::Allow,
            Some(_) => Decision::Deny(DenyReason::InsufficientRole),
        }
    }
}
