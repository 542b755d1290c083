//! Credential verification for the login endpoint
//!
//! Password storage lives outside this crate; the login handler only needs
//! something that turns a login name and password into an [`Identity`].
//! [`StaticCredentials`] is the config-backed implementation used by the
//! binary and the integration tests.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::config::UserAccount;
use crate::error::AuthError;
use crate::models::Identity;

/// Verifies login credentials
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Resolve `login` (username or email) and `password` to an identity
    ///
    /// Unknown users and wrong passwords both yield
    /// [`AuthError::InvalidCredentials`].
    async fn verify(&self, login: &str, password: &str) -> Result<Identity, AuthError>;

    /// Replace the password of `user_id` after checking `current_password`
    ///
    /// Fails with [`AuthError::UserNotFound`] when the account is gone and
    /// [`AuthError::IncorrectPassword`] when the current password is wrong.
    async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}

/// In-memory account list with argon2 password hashes
///
/// Password changes live only as long as the process.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    accounts: RwLock<Vec<UserAccount>>,
}

impl StaticCredentials {
    pub fn new(accounts: Vec<UserAccount>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    /// Number of configured accounts
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Writers only swap a single hash string, so a poisoned list is still
    // consistent.
    fn read(&self) -> RwLockReadGuard<'_, Vec<UserAccount>> {
        self.accounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<UserAccount>> {
        self.accounts.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, login: &str, password: &str) -> Result<Identity, AuthError> {
        let account = self
            .read()
            .iter()
            .find(|a| a.username == login || a.email == login)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &account.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        // Inactive state is only reported to callers holding the password
        if !account.active {
            return Err(AuthError::AccountInactive);
        }

        Ok(account.identity())
    }

    async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let current_hash = self
            .read()
            .iter()
            .find(|a| a.id == user_id)
            .map(|a| a.password_hash.clone())
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password(current_password, &current_hash) {
            return Err(AuthError::IncorrectPassword);
        }

        let new_hash = hash_password(new_password)?;

        let mut accounts = self.write();
        let account = accounts
            .iter_mut()
            .find(|a| a.id == user_id)
            .ok_or(AuthError::UserNotFound)?;

        // A concurrent change won the race
        if account.password_hash != current_hash {
            return Err(AuthError::IncorrectPassword);
        }
        account.password_hash = new_hash;

        info!(user_id = %user_id, "Password changed");
        Ok(())
    }
}

/// Hash a password with Argon2id and a random salt (PHC string format)
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Store(e.to_string()))
}

/// Verify a password against a stored PHC hash
///
/// Unparseable hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
