pub mod pending_action;
pub mod user;
