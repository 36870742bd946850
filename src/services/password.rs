//! One-way salted password hashing with Argon2id.
//!
//! Hashing and verification are CPU-bound, so both run on the blocking pool
//! instead of the async runtime.

use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use std::fmt;
use tokio::task;

use crate::config::SecurityConfig;

/// An Argon2 PHC string produced by [`PasswordHasher::hash`].
///
/// There is no public constructor, so a caller cannot hand the credential
/// store a value it hashed (or failed to hash) itself.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub async fn hash(&self, password: &str) -> Result<PasswordDigest> {
        let argon2 = self.argon2();
        let password = password.to_string();

        task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| PasswordDigest(hash.to_string()))
                .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))
        })
        .await
        .context("Password hashing task panicked")?
    }

    /// Checks `password` against a stored PHC string. The parameters embedded
    /// in the stored hash win over the configured ones.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let argon2 = self.argon2();
        let password = password.to_string();
        let stored_hash = stored_hash.to_string();

        task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&stored_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;
            Ok(argon2.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .context("Password verification task panicked")?
    }
}
