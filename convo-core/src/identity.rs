//! Identity abstraction: who is sending.
//!
//! Injected into the reconciliation store instead of read from ambient auth
//! state, so tests can pin the actor deterministically.

/// Supplies the current actor's stable identifier.
pub trait IdentityProvider: Send + Sync {
    /// Returns the current user id, or `None` when nobody is signed in.
    fn current_user_id(&self) -> Option<String>;
}

/// Fixed identity for tests and single-user embedding.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user_id: Option<String>,
}

impl StaticIdentity {
    /// Identity that always reports the given user id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    /// Identity with nobody signed in.
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
