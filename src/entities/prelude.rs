pub use super::pending_actions::Entity as PendingActions;
pub use super::users::Entity as Users;
