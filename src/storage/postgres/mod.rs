//! PostgreSQL storage implementations
//!
//! PostgreSQL is the production backend. Migrations are embedded and run at startup.

mod applications;
mod authorization_codes;
mod users;

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::sync::Arc;

pub use applications::PostgresApplicationStore;
pub use authorization_codes::PostgresAuthorizationCodeStore;
pub use users::PostgresUserStore;

/// Comprehensive PostgreSQL credential store
pub struct PostgresCredentialStore {
    pool: PgPool,
    application_store: Arc<PostgresApplicationStore>,
    user_store: Arc<PostgresUserStore>,
    authorization_code_store: Arc<PostgresAuthorizationCodeStore>,
}

impl PostgresCredentialStore {
    /// Create a new PostgreSQL credential store
    pub fn new(pool: PgPool) -> Self {
        Self::with_hash_cost(pool, DEFAULT_HASH_COST)
    }

    pub fn with_hash_cost(pool: PgPool, hash_cost: u32) -> Self {
        Self {
            application_store: Arc::new(PostgresApplicationStore::new(pool.clone(), hash_cost)),
            user_store: Arc::new(PostgresUserStore::new(pool.clone(), hash_cost)),
            authorization_code_store: Arc::new(PostgresAuthorizationCodeStore::new(pool.clone())),
            pool,
        }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/postgres")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for PostgresCredentialStore {
    async fn create_application(&self, application: &NewApplication) -> Result<Application> {
        self.application_store.create_application(application).await
    }

    async fn find_application_by_client_id(&self, client_id: &str) -> Result<Option<Application>> {
        self.application_store
            .find_application_by_client_id(client_id)
            .await
    }

    async fn find_application_by_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Option<Application>> {
        self.application_store
            .find_application_by_credentials(client_id, client_secret)
            .await
    }

    async fn permitted_scopes(&self, application_id: i64) -> Result<Vec<String>> {
        self.application_store.permitted_scopes(application_id).await
    }

    async fn permit_scopes(&self, application_id: i64, scopes: &[String]) -> Result<()> {
        self.application_store
            .permit_scopes(application_id, scopes)
            .await
    }
}

#[async_trait]
impl UserStore for PostgresCredentialStore {
    async fn create_user(&self, email: &str, password: &str) -> Result<User> {
        self.user_store.create_user(email, password).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_store.find_user_by_email(email).await
    }

    async fn find_user_by_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        self.user_store
            .find_user_by_credentials(email, password)
            .await
    }

    async fn find_user_by_refresh_token(
        &self,
        application_id: i64,
        token: &str,
    ) -> Result<Option<RefreshGrant>> {
        self.user_store
            .find_user_by_refresh_token(application_id, token)
            .await
    }

    async fn authorize_user(
        &self,
        user_id: i64,
        application_id: i64,
        scopes: &[String],
        refresh: bool,
    ) -> Result<Option<String>> {
        self.user_store
            .authorize_user(user_id, application_id, scopes, refresh)
            .await
    }
}

#[async_trait]
impl AuthorizationCodeStore for PostgresCredentialStore {
    async fn store_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        self.authorization_code_store
            .store_authorization_code(code)
            .await
    }

    async fn consume_authorization_code(
        &self,
        application_id: i64,
        code: &str,
    ) -> Result<Option<AuthorizationCode>> {
        self.authorization_code_store
            .consume_authorization_code(application_id, code)
            .await
    }
}

impl CredentialStore for PostgresCredentialStore {}
