use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::domain::{OtpId, UserId};
use crate::entities::pending_actions;
use crate::models::{ActionType, PendingAction, PrivilegedAction};

/// Fields of a ledger entry fixed at creation.
pub struct NewPendingAction<'a> {
    pub recipient: &'a str,
    pub code: &'a str,
    pub action: &'a PrivilegedAction,
    pub requested_by: Option<UserId>,
    pub expires_at: DateTime<Utc>,
}

/// The one-time-code ledger. Rows are only ever inserted and then flipped to
/// consumed; nothing else mutates them.
pub struct PendingActionRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PendingActionRepository<'a, C> {
    #[must_use]
    pub const fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        entry: NewPendingAction<'_>,
        now: DateTime<Utc>,
    ) -> Result<PendingAction> {
        let payload =
            serde_json::to_string(entry.action).context("Failed to encode pending action")?;

        let active = pending_actions::ActiveModel {
            recipient: Set(entry.recipient.to_string()),
            code: Set(entry.code.to_string()),
            action_type: Set(entry.action.action_type().as_str().to_string()),
            payload: Set(payload),
            requested_by: Set(entry.requested_by.map(|id| id.value())),
            expires_at: Set(entry.expires_at),
            consumed: Set(false),
            consumed_at: Set(None),
            created_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(self.conn)
            .await
            .context("Failed to insert pending action")?;
        PendingAction::try_from(model)
    }

    /// Entry `id` of type `action_type`, only if `code` is its code.
    pub async fn find_matching(
        &self,
        id: OtpId,
        code: &str,
        action_type: ActionType,
    ) -> Result<Option<PendingAction>> {
        let model = pending_actions::Entity::find_by_id(id.value())
            .filter(pending_actions::Column::Code.eq(code))
            .filter(pending_actions::Column::ActionType.eq(action_type.as_str()))
            .one(self.conn)
            .await
            .with_context(|| format!("Failed to query pending action {id}"))?;

        model.map(PendingAction::try_from).transpose()
    }

    /// Flips `consumed` iff the entry is still unconsumed and id, code and
    /// action type all match. At most one caller ever sees `true` for a row.
    pub async fn consume(
        &self,
        id: OtpId,
        code: &str,
        action_type: ActionType,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = pending_actions::Entity::update_many()
            .col_expr(pending_actions::Column::Consumed, Expr::value(true))
            .col_expr(pending_actions::Column::ConsumedAt, Expr::value(Some(now)))
            .filter(pending_actions::Column::Id.eq(id.value()))
            .filter(pending_actions::Column::Code.eq(code))
            .filter(pending_actions::Column::ActionType.eq(action_type.as_str()))
            .filter(pending_actions::Column::Consumed.eq(false))
            .exec(self.conn)
            .await
            .with_context(|| format!("Failed to consume pending action {id}"))?;

        Ok(result.rows_affected == 1)
    }
}
