//! Who is driving the client: a guest or an authenticated user.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// The current authentication identity.
///
/// Resolved once per session bootstrap. Any change in `user_id` (including
/// to or from "no user") is an identity transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Identity {
    /// A visitor who has not signed in.
    #[default]
    Anonymous,
    /// A signed-in account.
    Authenticated {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
}

impl Identity {
    /// Shorthand for an authenticated identity.
    #[must_use]
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self::Authenticated {
            user_id: user_id.into(),
        }
    }

    /// The authenticated user, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { user_id } => Some(user_id),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Authenticated { user_id } => write!(f, "user:{user_id}"),
        }
    }
}
