//! PostgreSQL implementation for user and refresh token storage

use crate::errors::StorageError;
use crate::oauth::types::{RefreshGrant, User, generate_token};
use crate::storage::traits::{Result, UserStore, hash_secret, verify_secret};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

const REFRESH_TOKEN_TYPE: &str = "refresh_token";

/// PostgreSQL implementation of user storage
pub struct PostgresUserStore {
    pool: PgPool,
    hash_cost: u32,
}

impl PostgresUserStore {
    /// Create a new PostgreSQL user store
    pub fn new(pool: PgPool, hash_cost: u32) -> Self {
        Self { pool, hash_cost }
    }

    fn row_to_user(row: &PgRow) -> Result<User> {
        Ok(User {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::DatabaseError(format!("Failed to get id: {}", e)))?,
            email: row
                .try_get("email")
                .map_err(|e| StorageError::DatabaseError(format!("Failed to get email: {}", e)))?,
        })
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn create_user(&self, email: &str, password: &str) -> Result<User> {
        let password_hash = hash_secret(password, self.hash_cost).await?;

        let row = sqlx::query(
            "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING id, email",
        )
        .bind(email)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::NotUnique("email".to_string())
            }
            e => StorageError::DatabaseError(e.to_string()),
        })?;

        Self::row_to_user(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_user_by_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, password_hash FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let password_hash: String = row.try_get("password_hash").map_err(|e| {
            StorageError::DatabaseError(format!("Failed to get password_hash: {}", e))
        })?;

        if verify_secret(password, &password_hash).await {
            Self::row_to_user(&row).map(Some)
        } else {
            Ok(None)
        }
    }

    async fn find_user_by_refresh_token(
        &self,
        application_id: i64,
        token: &str,
    ) -> Result<Option<RefreshGrant>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.email, t.id AS token_id
            FROM oauth_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.application_id = $1
              AND t.token = $2
              AND t.token_type = $3
              AND (t.expires_at IS NULL OR t.expires_at > now())
            "#,
        )
        .bind(application_id)
        .bind(token)
        .bind(REFRESH_TOKEN_TYPE)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user = Self::row_to_user(&row)?;
        let token_id: i64 = row
            .try_get("token_id")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get token_id: {}", e)))?;

        let scopes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT s.name FROM authorized_scopes a
            JOIN scopes s ON s.id = a.scope_id
            WHERE a.token_id = $1
            ORDER BY s.name
            "#,
        )
        .bind(token_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(Some(RefreshGrant { user, scopes }))
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

        // Dropping the transaction on any early return rolls both writes back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        let token = generate_token();
        let token_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO oauth_tokens (application_id, user_id, token, token_type)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(application_id)
        .bind(user_id)
        .bind(&token)
        .bind(REFRESH_TOKEN_TYPE)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO authorized_scopes (token_id, scope_id)
            SELECT $1, s.id FROM scopes s
            JOIN permitted_scopes p ON p.scope_id = s.id
            WHERE p.application_id = $2 AND s.name = ANY($3)
            "#,
        )
        .bind(token_id)
        .bind(application_id)
        .bind(scopes)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(Some(token))
    }
}
