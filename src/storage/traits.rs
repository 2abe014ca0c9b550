//! Storage trait definitions for the credential store.
//!
//! Lookups that verify a secret return `Ok(None)` both when the record is
//! missing and when the secret does not match, so callers cannot tell the two
//! apart. Secret comparison only happens once a record has been found by its
//! identifier; the timing difference that reveals existence is accepted.

use crate::errors::StorageError;
use crate::oauth::types::*;
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, StorageError>;

/// bcrypt cost used for stored passwords and client secrets
pub const DEFAULT_HASH_COST: u32 = 12;

/// Trait for registered client applications
#[async_trait]
pub trait ApplicationStore {
    /// Register an application. The returned value carries the plain secret once.
    async fn create_application(&self, application: &NewApplication) -> Result<Application>;

    /// Retrieve an application by its public client identifier
    async fn find_application_by_client_id(&self, client_id: &str) -> Result<Option<Application>>;

    /// Retrieve an application whose secret matches
    async fn find_application_by_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Option<Application>>;

    /// Scopes the application may request
    async fn permitted_scopes(&self, application_id: i64) -> Result<Vec<String>>;

    /// Administratively permit scopes for an application
    async fn permit_scopes(&self, application_id: i64, scopes: &[String]) -> Result<()>;
}

/// Trait for end users and their refresh tokens
#[async_trait]
pub trait UserStore {
    /// Create a user. Fails with [`StorageError::NotUnique`] when the email is taken.
    async fn create_user(&self, email: &str, password: &str) -> Result<User>;

    /// Retrieve a user by email, used to resolve bearer token subjects
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Retrieve a user whose password matches
    async fn find_user_by_credentials(&self, email: &str, password: &str) -> Result<Option<User>>;

    /// Retrieve the owner of a non-expired refresh token issued to `application_id`
    async fn find_user_by_refresh_token(
        &self,
        application_id: i64,
        token: &str,
    ) -> Result<Option<RefreshGrant>>;

    /// Authorize a user for an application.
    ///
    /// With `refresh` set, a refresh token is created and the requested scopes
    /// that the application is permitted are attached to it in one atomic
    /// write. Returns the refresh token.
    async fn authorize_user(
        &self,
        user_id: i64,
        application_id: i64,
        scopes: &[String],
        refresh: bool,
    ) -> Result<Option<String>>;
}

/// Trait for storing and consuming authorization codes
#[async_trait]
pub trait AuthorizationCodeStore {
    /// Store a new authorization code
    async fn store_authorization_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Remove and return a code issued to `application_id`.
    ///
    /// Returns `None` for unknown, expired, or foreign codes. A code is never
    /// returned twice.
    async fn consume_authorization_code(
        &self,
        application_id: i64,
        code: &str,
    ) -> Result<Option<AuthorizationCode>>;
}

// ===== Combined Storage Trait =====

/// Combined credential store trait
pub trait CredentialStore:
    ApplicationStore + UserStore + AuthorizationCodeStore + Send + Sync
{
}

/// Hash a secret with bcrypt off the async executor
pub async fn hash_secret(secret: &str, cost: u32) -> Result<String> {
    let secret = secret.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost))
        .await
        .map_err(|e| StorageError::HashingFailed(e.to_string()))?
        .map_err(|e| StorageError::HashingFailed(e.to_string()))
}

/// Compare a secret with a bcrypt hash off the async executor
pub async fn verify_secret(secret: &str, hash: &str) -> bool {
    let secret = secret.to_owned();
    let hash = hash.to_owned();

    tokio::task::spawn_blocking(move || bcrypt::verify(&secret, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}
