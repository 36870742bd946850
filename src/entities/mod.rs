pub mod prelude;

pub mod pending_actions;
pub mod users;
