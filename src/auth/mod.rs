//! Authentication and authorization module
//!
//! Turns a bearer token into an authenticated identity and decides, through
//! the permission gate, what that identity may do.

mod gate;
mod jwt;
mod middleware;

pub use gate::{Capability, Decision, DenyReason, PermissionGate, RoleGate};
pub use jwt::{Claims, JwtKeys};
pub use middleware::identity_middleware;

use serde::{Deserialize, Serialize};

/// User roles for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can browse terms and the review queue
    Viewer,
    /// Can propose new terms and edits
    Contributor,
    /// Can approve, reject and request changes
    Reviewer,
    /// Can manage terms directly and delete proposals
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Role::Viewer
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Contributor => write!(f, "contributor"),
            Role::Reviewer => write!(f, "reviewer"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "contributor" => Ok(Role::Contributor),
            "reviewer" => Ok(Role::Reviewer),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: None,
            role,
        }
    }
}

/// Whoever is making the current request, possibly nobody
#[derive(Debug, Clone, Default)]
pub struct Caller(Option<Identity>);

impl Caller {
    pub fn anonymous() -> Self {
        Caller(None)
    }

    pub fn authenticated(identity: Identity) -> Self {
        Caller(Some(identity))
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}
