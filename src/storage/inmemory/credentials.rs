//! In-memory credential storage implementation

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Clone)]
struct StoredRefreshToken {
    application_id: i64,
    user_id: i64,
    scopes: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory implementation of the credential store
pub struct MemoryCredentialStore {
    hash_cost: u32,
    next_id: AtomicI64,
    users: Mutex<HashMap<String, StoredUser>>, // email -> user
    applications: Mutex<HashMap<String, Application>>, // client_id -> application
    permitted_scopes: Mutex<HashMap<i64, HashSet<String>>>,
    refresh_tokens: Mutex<HashMap<String, StoredRefreshToken>>,
    authorization_codes: Mutex<HashMap<String, AuthorizationCode>>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            hash_cost: DEFAULT_HASH_COST,
            next_id: AtomicI64::new(1),
            users: Mutex::default(),
            applications: Mutex::default(),
            permitted_scopes: Mutex::default(),
            refresh_tokens: Mutex::default(),
            authorization_codes: Mutex::default(),
        }
    }

    /// Override the bcrypt cost. Only meant for tests.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn refresh_token_count(&self) -> usize {
        self.refresh_tokens
            .lock()
            .map(|tokens| tokens.len())
            .unwrap_or_default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| StorageError::SerializationFailed(format!("Lock error: {}", e)))
}

#[async_trait]
impl ApplicationStore for MemoryCredentialStore {
    async fn create_application(&self, application: &NewApplication) -> Result<Application> {
        let client_secret = generate_token();
        let hashed_client_secret = hash_secret(&client_secret, self.hash_cost).await?;

        let created = Application {
            id: self.next_id(),
            name: application.name.clone(),
            description: application.description.clone(),
            website: application.website.clone(),
            logo: application.logo.clone(),
            client_type: application.client_type,
            client_id: generate_token(),
            client_secret: None,
            hashed_client_secret,
            created_at: Utc::now(),
        };

        let mut applications = lock(&self.applications)?;
        if applications.contains_key(&created.client_id) {
            return Err(StorageError::NotUnique("client_id".to_string()));
        }
        applications.insert(created.client_id.clone(), created.clone());

        Ok(Application {
            client_secret: Some(client_secret),
            ..created
        })
    }

    async fn find_application_by_client_id(&self, client_id: &str) -> Result<Option<Application>> {
        let applications = lock(&self.applications)?;
        Ok(applications.get(client_id).cloned())
    }

    async fn find_application_by_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Option<Application>> {
        let Some(application) = self.find_application_by_client_id(client_id).await? else {
            return Ok(None);
        };

        if verify_secret(client_secret, &application.hashed_client_secret).await {
            Ok(Some(application))
        } else {
            Ok(None)
        }
    }

    async fn permitted_scopes(&self, application_id: i64) -> Result<Vec<String>> {
        let permitted = lock(&self.permitted_scopes)?;
        let mut scopes: Vec<String> = permitted
            .get(&application_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        scopes.sort();
        Ok(scopes)
    }

    async fn permit_scopes(&self, application_id: i64, scopes: &[String]) -> Result<()> {
        let mut permitted = lock(&self.permitted_scopes)?;
        permitted
            .entry(application_id)
            .or_default()
            .extend(scopes.iter().cloned());
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryCredentialStore {
    async fn create_user(&self, email: &str, password: &str) -> Result<User> {
        let password_hash = hash_secret(password, self.hash_cost).await?;

        let mut users = lock(&self.users)?;
        if users.contains_key(email) {
            return Err(StorageError::NotUnique("email".to_string()));
        }

        let user = User {
            id: self.next_id(),
            email: email.to_string(),
        };
        users.insert(
            email.to_string(),
            StoredUser {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = lock(&self.users)?;
        Ok(users.get(email).map(|stored| stored.user.clone()))
    }

    async fn find_user_by_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let stored = {
            let users = lock(&self.users)?;
            users.get(email).cloned()
        };
        let Some(stored) = stored else {
            return Ok(None);
        };

        if verify_secret(password, &stored.password_hash).await {
            Ok(Some(stored.user))
        } else {
            Ok(None)
        }
    }

    async fn find_user_by_refresh_token(
        &self,
        application_id: i64,
        token: &str,
    ) -> Result<Option<RefreshGrant>> {
        let record = {
            let refresh_tokens = lock(&self.refresh_tokens)?;
            refresh_tokens.get(token).cloned()
        };
        let Some(record) = record else {
            return Ok(None);
        };

        if record.application_id != application_id {
            return Ok(None);
        }
        if record.expires_at.is_some_and(|expires_at| expires_at <= Utc::now()) {
            return Ok(None);
        }

        let users = lock(&self.users)?;
        Ok(users
            .values()
            .find(|stored| stored.user.id == record.user_id)
            .map(|stored| RefreshGrant {
                user: stored.user.clone(),
                scopes: record.scopes,
            }))
    }

    async fn authorize_user(
        &self,
        user_id: i64,
        application_id: i64,
        scopes: &[String],
        refresh: bool,
    ) -> Result<Option<String>> {
        if !refresh {
            return Ok(None);
        }

        // Both locks are held so the token and its scopes land together.
        let permitted = lock(&self.permitted_scopes)?;
        let mut refresh_tokens = lock(&self.refresh_tokens)?;

        let allowed = permitted.get(&application_id);
        let mut granted: Vec<String> = scopes
            .iter()
            .filter(|scope| allowed.is_some_and(|allowed| allowed.contains(*scope)))
            .cloned()
            .collect();
        granted.sort();
        granted.dedup();

        let token = generate_token();
        refresh_tokens.insert(
            token.clone(),
            StoredRefreshToken {
                application_id,
                user_id,
                scopes: granted,
                expires_at: None,
            },
        );
        Ok(Some(token))
    }
}

#[async_trait]
impl AuthorizationCodeStore for MemoryCredentialStore {
    async fn store_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        let now = Utc::now();
        let mut codes = lock(&self.authorization_codes)?;
        codes.retain(|_, stored| stored.expires_at > now);
        codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        application_id: i64,
        code: &str,
    ) -> Result<Option<AuthorizationCode>> {
        let mut codes = lock(&self.authorization_codes)?;

        let owned = codes
            .get(code)
            .is_some_and(|stored| stored.application_id == application_id);
        if !owned {
            return Ok(None);
        }

        Ok(codes
            .remove(code)
            .filter(|stored| stored.expires_at > Utc::now()))
    }
}

impl CredentialStore for MemoryCredentialStore {}
