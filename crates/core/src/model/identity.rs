use serde::{Deserialize, Serialize};

use crate::model::ids::IdentityId;

/// Read-only copy of the externally authenticated account a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub email: String,
}

impl Identity {
    #[must_use]
    pub fn new(id: IdentityId, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            email: email.into(),
        }
    }
}
