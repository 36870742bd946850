pub mod pending_action;
pub mod user;

pub use pending_action::{ActionType, PendingAction, PendingHandle, PrivilegedAction};
pub use user::{NewUser, Role, StoredCredentials, User, UserChanges};
