use sea_orm::entity::prelude::*;

/// One-time-code ledger entry guarding a deferred privileged mutation.
/// Rows are never deleted, consumed or expired ones are kept for audit.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pending_actions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Mailbox the code was sent to.
    pub recipient: String,

    /// Six ASCII digits, not unique across rows.
    pub code: String,

    /// `create_admin`, `update_admin` or `update_admin_password`
    pub action_type: String,

    /// JSON encoding of the deferred mutation.
    #[sea_orm(column_type = "Text")]
    pub payload: String,

    /// Admin who submitted the original request.
    pub requested_by: Option<i32>,

    pub expires_at: DateTimeUtc,

    pub consumed: bool,

    pub consumed_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
