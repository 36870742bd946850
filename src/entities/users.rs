use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Case-sensitive, unique across active and soft-deleted rows.
    #[sea_orm(unique)]
    pub username: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// `admin` or `user`
    pub role: String,

    /// Stored lowercased so uniqueness is case-insensitive.
    #[sea_orm(unique)]
    pub email: String,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    /// Soft-delete flag; rows are never removed.
    pub is_active: bool,

    pub login_attempts: i32,

    pub locked_until: Option<DateTimeUtc>,

    pub last_login: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
