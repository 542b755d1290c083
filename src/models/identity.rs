//! Identity snapshot attached to authenticated requests

use serde::{Deserialize, Serialize};

/// Immutable snapshot of a principal taken at login time
///
/// Both the session registry and signed tokens carry a copy of this value,
/// so a role change only becomes visible after the user logs in again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role_id: String,
    pub role_name: String,
}

impl Identity {
    /// Create a new identity
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        role_id: impl Into<String>,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            email: email.into(),
            role_id: role_id.into(),
            role_name: role_name.into(),
        }
    }

    /// Check whether the role name is one of `allowed` (exact, case-sensitive)
    pub fn has_any_role<S: AsRef<str>>(&self, allowed: &[S]) -> bool {
        allowed.iter().any(|r| r.as_ref() == self.role_name)
    }
}
