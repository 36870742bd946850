use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::UserId;
use crate::entities::users;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// A user as exposed outside the credential store. Carries no secret or
/// lockout state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Active admins can only be changed through the approval workflow.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.role == Role::Admin && self.is_active
    }
}

impl TryFrom<users::Model> for User {
    type Error = anyhow::Error;

    fn try_from(model: users::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(model.id),
            role: model.role.parse().map_err(anyhow::Error::msg)?,
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            is_active: model.is_active,
            last_login: model.last_login,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// What login needs beyond the public profile.
#[derive(Clone)]
pub struct StoredCredentials {
    pub user: User,
    pub password_hash: String,
    pub login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("user", &self.user)
            .field("password_hash", &"<redacted>")
            .field("login_attempts", &self.login_attempts)
            .field("locked_until", &self.locked_until)
            .finish()
    }
}

impl TryFrom<users::Model> for StoredCredentials {
    type Error = anyhow::Error;

    fn try_from(model: users::Model) -> Result<Self, Self::Error> {
        let password_hash = model.password_hash.clone();
        let login_attempts = u32::try_from(model.login_attempts).unwrap_or(0);
        let locked_until = model.locked_until;
        Ok(Self {
            user: User::try_from(model)?,
            password_hash,
            login_attempts,
            locked_until,
        })
    }
}

/// Full field set for a user that does not exist yet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

/// Partial profile update. Password fields have no place here; password
/// changes go through their own operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl UserChanges {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }

    #[must_use]
    pub fn promotes_to_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    /// Restricts the change set to what a user may edit on their own profile.
    #[must_use]
    pub fn profile_only(self) -> Self {
        Self {
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.as_str(), "user");
        assert!("root".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn changes_ignore_password_fields() {
        let changes: UserChanges = serde_json::from_value(serde_json::json!({
            "password": "Secret123",
            "passwordHash": "$argon2id$...",
        }))
        .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn profile_only_drops_privileged_fields() {
        let changes = UserChanges {
            username: Some("eve".into()),
            role: Some(Role::Admin),
            is_active: Some(false),
            first_name: Some("Eve".into()),
            ..UserChanges::default()
        }
        .profile_only();

        assert!(!changes.promotes_to_admin());
        assert_eq!(changes.username, None);
        assert_eq!(changes.is_active, None);
        assert_eq!(changes.first_name.as_deref(), Some("Eve"));
    }

    #[test]
    fn new_user_debug_redacts_password() {
        let user = NewUser {
            username: "carol".into(),
            password: "Hunter2Hunter2".into(),
            role: Role::User,
            email: "carol@example.com".into(),
            first_name: None,
            last_name: None,
        };
        let debug = format!("{user:?}");
        assert!(!debug.contains("Hunter2Hunter2"));
        assert!(debug.contains("carol"));
    }
}
