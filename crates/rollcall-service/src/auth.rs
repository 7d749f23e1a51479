//! Admin accounts.
//!
//! Passwords are stored only as Argon2id PHC strings with a random salt
//! from [`OsRng`]. There is no other credential form.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rollcall_core::AdminUser;
use thiserror::Error;

use crate::activity::Action;
use crate::{Service, ServiceError};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Hash a plaintext password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(AuthError::Hash)?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; a malformed stored hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(AuthError::Hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Hash(e)),
    }
}

impl Service {
    /// Create the admin account, or replace its password and email.
    pub fn reset_admin(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<AdminUser, ServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ServiceError::Validation("Username is required.".into()));
        }
        if password.is_empty() {
            return Err(ServiceError::Validation("Password is required.".into()));
        }

        let hash = hash_password(password)?;
        let admin = self.store.upsert_admin(username, &hash, email.trim())?;
        tracing::info!(username, "admin credentials reset");
        self.log_activity(Action::AdminReset, format!("Admin account {username} reset"));
        Ok(admin)
    }

    /// Verify admin credentials.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub fn login(&self, username: &str, password: &str) -> Result<AdminUser, ServiceError> {
        let Some(admin) = self.store.get_admin(username.trim())? else {
            tracing::warn!(username, "login rejected: unknown user");
            return Err(ServiceError::InvalidCredentials);
        };

        match verify_password(password, &admin.password_hash) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(username, "login rejected: wrong password");
                return Err(ServiceError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(username, error = %e, "stored admin hash is unusable");
                return Err(ServiceError::InvalidCredentials);
            }
        }

        tracing::info!(username = %admin.username, "admin logged in");
        self.log_activity(
            Action::AdminLogin,
            format!("Admin {} logged in", admin.username),
        );
        Ok(admin)
    }
}
