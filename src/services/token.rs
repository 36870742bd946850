//! Self-contained HS256 session tokens.
//!
//! Expiry is checked here against the injected time rather than by
//! `jsonwebtoken`, which would read the system clock.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::UserId;
use crate::models::{Role, User};

pub const TOKEN_ISSUER: &str = "site-admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iss: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub
            .parse::<i32>()
            .map(UserId::new)
            .map_err(|_| TokenError::Invalid)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,

    #[error("Token expired")]
    Expired,

    #[error("Failed to sign token")]
    Signing,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &[u8], lifetime: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.set_issuer(&[TOKEN_ISSUER]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime,
        }
    }

    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<(String, Claims), TokenError> {
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| TokenError::Signing)?;
        Ok((token, claims))
    }

    /// Pure check of signature, structure, issuer and expiry.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| TokenError::Invalid)?;
        let claims = data.claims;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        claims.user_id()?;

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(9),
            username: "bob".into(),
            role,
            email: "bob@example.com".into(),
            first_name: None,
            last_name: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-secret-which-is-long-enough", Duration::hours(24))
    }

    #[test]
    fn issued_token_verifies_with_claims() {
        let now = Utc::now();
        let (token, issued) = issuer().issue(&user(Role::Admin), now).unwrap();

        let claims = issuer().verify(&token, now + Duration::hours(1)).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.user_id().unwrap(), UserId::new(9));
        assert!(claims.is_admin());
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn token_expires_at_lifetime() {
        let now = Utc::now();
        let (token, _) = issuer().issue(&user(Role::User), now).unwrap();

        assert!(issuer().verify(&token, now + Duration::hours(24) - Duration::seconds(1)).is_ok());
        assert_eq!(
            issuer().verify(&token, now + Duration::hours(24)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let now = Utc::now();
        let (token, _) = issuer().issue(&user(Role::User), now).unwrap();
        let other = TokenIssuer::new(b"another-secret", Duration::hours(24));
        assert_eq!(other.verify(&token, now), Err(TokenError::Invalid));
    }

    #[test]
    fn tampered_payload_is_invalid() {
        let now = Utc::now();
        let (token, _) = issuer().issue(&user(Role::User), now).unwrap();

        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let (forged, _) = issuer().issue(&user(Role::Admin), now).unwrap();
        parts[1] = forged.split('.').nth(1).unwrap().to_string();
        let tampered = parts.join(".");

        assert_eq!(issuer().verify(&tampered, now), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_invalid() {
        let now = Utc::now();
        for token in ["", "abc", "a.b.c", "Bearer x.y.z"] {
            assert_eq!(issuer().verify(token, now), Err(TokenError::Invalid));
        }
    }
}
