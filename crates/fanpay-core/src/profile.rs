//! Public identity of a user, joined into invoices.

use serde::{Deserialize, Serialize};

use crate::{BillingError, UserId};

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 32;

/// Display identity for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Owner.
    pub user_id: UserId,
    /// Handle shown in rooms.
    pub username: String,
    /// Legal or display name.
    pub full_name: Option<String>,
}

impl UserProfile {
    /// Validate and build a profile.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the username is blank, too long, or contains whitespace.
    pub fn new(
        user_id: UserId,
        username: &str,
        full_name: Option<String>,
    ) -> Result<Self, BillingError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(BillingError::InvalidInput("username is required".into()));
        }
        if username.len() > MAX_USERNAME_LEN {
            return Err(BillingError::InvalidInput(format!(
                "username is limited to {MAX_USERNAME_LEN} characters"
            )));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(BillingError::InvalidInput(
                "username cannot contain spaces".into(),
            ));
        }
        Ok(Self {
            user_id,
            username: username.to_string(),
            full_name: full_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_full_name_is_dropped() {
        let p = UserProfile::new(UserId::generate(), " luna ", Some("  ".into())).unwrap();
        assert_eq!(p.username, "luna");
        assert_eq!(p.full_name, None);
    }

    #[test]
    fn usernames_are_validated() {
        let id = UserId::generate();
        assert!(UserProfile::new(id, "", None).is_err());
        assert!(UserProfile::new(id, "two words", None).is_err());
        assert!(UserProfile::new(id, &"x".repeat(33), None).is_err());
    }
}
