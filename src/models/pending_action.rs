use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{OtpId, UserId};
use crate::entities::pending_actions;
use crate::models::user::{NewUser, UserChanges};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateAdmin,
    UpdateAdmin,
    UpdateAdminPassword,
}

impl ActionType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateAdmin => "create_admin",
            Self::UpdateAdmin => "update_admin",
            Self::UpdateAdminPassword => "update_admin_password",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_admin" => Ok(Self::CreateAdmin),
            "update_admin" => Ok(Self::UpdateAdmin),
            "update_admin_password" => Ok(Self::UpdateAdminPassword),
            other => Err(format!("Unknown action type: {other}")),
        }
    }
}

/// A mutation held back until its one-time code is verified. The ledger
/// stores this value as JSON and replays it verbatim.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrivilegedAction {
    CreateAdmin {
        user: NewUser,
    },
    UpdateAdmin {
        target_id: UserId,
        changes: UserChanges,
    },
    UpdateAdminPassword {
        target_id: UserId,
        new_password: String,
    },
}

impl PrivilegedAction {
    #[must_use]
    pub const fn action_type(&self) -> ActionType {
        match self {
            Self::CreateAdmin { .. } => ActionType::CreateAdmin,
            Self::UpdateAdmin { .. } => ActionType::UpdateAdmin,
            Self::UpdateAdminPassword { .. } => ActionType::UpdateAdminPassword,
        }
    }

    #[must_use]
    pub const fn target(&self) -> Option<UserId> {
        match self {
            Self::CreateAdmin { .. } => None,
            Self::UpdateAdmin { target_id, .. } | Self::UpdateAdminPassword { target_id, .. } => {
                Some(*target_id)
            }
        }
    }
}

impl fmt::Debug for PrivilegedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateAdmin { user } => f.debug_struct("CreateAdmin").field("user", user).finish(),
            Self::UpdateAdmin { target_id, changes } => f
                .debug_struct("UpdateAdmin")
                .field("target_id", target_id)
                .field("changes", changes)
                .finish(),
            Self::UpdateAdminPassword { target_id, .. } => f
                .debug_struct("UpdateAdminPassword")
                .field("target_id", target_id)
                .field("new_password", &"<redacted>")
                .finish(),
        }
    }
}

/// Ledger entry as seen by services. The code itself is never exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub id: OtpId,
    pub recipient: String,
    pub action: PrivilegedAction,
    pub requested_by: Option<UserId>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    /// Verifiable iff not yet consumed and strictly before expiry.
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now < self.expires_at
    }
}

impl TryFrom<pending_actions::Model> for PendingAction {
    type Error = anyhow::Error;

    fn try_from(model: pending_actions::Model) -> Result<Self, Self::Error> {
        let action: PrivilegedAction = serde_json::from_str(&model.payload)?;
        let stored_type: ActionType = model.action_type.parse().map_err(anyhow::Error::msg)?;
        if stored_type != action.action_type() {
            anyhow::bail!(
                "Pending action {} payload is {} but row says {}",
                model.id,
                action.action_type(),
                stored_type
            );
        }

        Ok(Self {
            id: OtpId::new(model.id),
            recipient: model.recipient,
            action,
            requested_by: model.requested_by.map(UserId::new),
            expires_at: model.expires_at,
            consumed: model.consumed,
            consumed_at: model.consumed_at,
            created_at: model.created_at,
        })
    }
}

/// Returned to the caller when a mutation has been deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingHandle {
    pub otp_id: OtpId,
    pub action_type: ActionType,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn action_type_strings_match_ledger_values() {
        for kind in [
            ActionType::CreateAdmin,
            ActionType::UpdateAdmin,
            ActionType::UpdateAdminPassword,
        ] {
            assert_eq!(kind.as_str().parse::<ActionType>().unwrap(), kind);
        }
    }

    #[test]
    fn payload_is_tagged_by_action() {
        let action = PrivilegedAction::UpdateAdmin {
            target_id: UserId::new(4),
            changes: UserChanges {
                role: Some(Role::User),
                ..UserChanges::default()
            },
        };

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "update_admin");
        assert_eq!(json["target_id"], 4);
        assert_eq!(json["changes"]["role"], "user");
        assert_eq!(action.target(), Some(UserId::new(4)));
    }

    #[test]
    fn password_payload_debug_is_redacted() {
        let action = PrivilegedAction::UpdateAdminPassword {
            target_id: UserId::new(1),
            new_password: "NewPassw0rd".into(),
        };
        assert!(!format!("{action:?}").contains("NewPassw0rd"));
    }

    #[test]
    fn pending_action_closes_at_expiry() {
        let now = Utc::now();
        let entry = PendingAction {
            id: OtpId::new(1),
            recipient: "ops@example.com".into(),
            action: PrivilegedAction::UpdateAdminPassword {
                target_id: UserId::new(1),
                new_password: "NewPassw0rd".into(),
            },
            requested_by: None,
            expires_at: now,
            consumed: false,
            consumed_at: None,
            created_at: now - chrono::Duration::minutes(10),
        };

        assert!(entry.is_open(now - chrono::Duration::seconds(1)));
        assert!(!entry.is_open(now));
    }
}
