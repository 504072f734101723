//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::auth::{JwtKeys, RoleGate};
use crate::governance::GovernanceEngine;
use crate::store::GlossaryStore;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Every read and write of terms and proposals goes through here
    pub engine: GovernanceEngine,

    /// Bearer token verification
    pub jwt: JwtKeys,
}

impl AppState {
    pub fn new(store: Arc<dyn GlossaryStore>, jwt: JwtKeys) -> Self {
        Self {
            engine: GovernanceEngine::new(store, Arc::new(RoleGate)),
            jwt,
        }
    }
}

/// Type alias for shared application state
pub type SharedState = Arc<AppState>;
