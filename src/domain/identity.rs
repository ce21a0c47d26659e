//! Signed-in user identity.

use serde::{Deserialize, Serialize};

/// Placeholder creator uid used when nobody is signed in.
pub const ANONYMOUS_UID: &str = "anonymous";

/// The identity of the signed-in user, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Provider-assigned user id.
    pub uid: String,
    /// Email, if the provider exposes one.
    pub email: Option<String>,
    /// Display name, if set.
    pub display_name: Option<String>,
}

impl UserIdentity {
    /// Creates an identity with only a uid.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }
}
