//! User Aggregate
//!
//! Accounts are owned by the identity collaborator; this crate only reads
//! them, resolves bearer tokens to them and flips their active flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::order::UnknownVariant;
use crate::domain::value_objects::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self { Role::User => "user", Role::Admin => "admin" }
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl User {
    pub fn register(username: impl Into<String>, email: impl Into<String>, first_name: impl Into<String>, last_name: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::generate(), username: username.into(), email: email.into(),
            first_name: first_name.into(), last_name: last_name.into(), role, is_active: true,
            created_at: now, updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn toggle_active(&mut self) -> bool {
        self.is_active = !self.is_active;
        self.updated_at = Utc::now();
        self.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        let mut user = User::register("jane", "jane@example.com", "Jane", "Smith", Role::User);
        assert!(user.is_active);
        assert!(!user.toggle_active());
        assert!(user.toggle_active());
        assert!(!user.is_admin());
    }

    #[test]
    fn test_role_strings() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::User.as_str(), "user");
    }
}
