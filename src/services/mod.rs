pub mod lockout;
pub mod mailer;
pub mod password;
pub mod privileged;
pub mod token;

pub use lockout::{FailureOutcome, LockoutPolicy};
pub use mailer::{LogMailer, Mailer, MemoryMailer, OutgoingMail, SmtpMailer};
pub use password::{PasswordDigest, PasswordHasher};
pub use privileged::{Applied, PrivilegedActions};
pub use token::{Claims, TokenError, TokenIssuer};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, LoginResult, SessionUser};
pub use auth_service_impl::SeaOrmAuthService;

pub mod user_service;
pub mod user_service_impl;
pub use user_service::{Outcome, UserError, UserService};
pub use user_service_impl::SeaOrmUserService;
