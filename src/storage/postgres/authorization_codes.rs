//! PostgreSQL implementation for authorization code storage

use crate::errors::StorageError;
use crate::oauth::types::AuthorizationCode;
use crate::storage::traits::{AuthorizationCodeStore, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

/// PostgreSQL implementation of authorization code storage
pub struct PostgresAuthorizationCodeStore {
    pool: PgPool,
}

impl PostgresAuthorizationCodeStore {
    /// Create a new PostgreSQL authorization code store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert PostgreSQL row to AuthorizationCode
    fn row_to_authorization_code(row: &PgRow) -> Result<AuthorizationCode> {
        let get = |name: &str, e: sqlx::Error| {
            StorageError::DatabaseError(format!("Failed to get {}: {}", name, e))
        };

        Ok(AuthorizationCode {
            code: row.try_get("code").map_err(|e| get("code", e))?,
            application_id: row
                .try_get("application_id")
                .map_err(|e| get("application_id", e))?,
            user_id: row.try_get("user_id").map_err(|e| get("user_id", e))?,
            subject: row.try_get("subject").map_err(|e| get("subject", e))?,
            redirect_uri: row
                .try_get("redirect_uri")
                .map_err(|e| get("redirect_uri", e))?,
            scopes: row.try_get("scopes").map_err(|e| get("scopes", e))?,
            created_at: row.try_get("created_at").map_err(|e| get("created_at", e))?,
            expires_at: row.try_get("expires_at").map_err(|e| get("expires_at", e))?,
        })
    }
}

#[async_trait]
impl AuthorizationCodeStore for PostgresAuthorizationCodeStore {
    async fn store_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query("DELETE FROM authorization_codes WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO authorization_codes (
                code, application_id, user_id, subject, redirect_uri, scopes, created_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&code.code)
        .bind(code.application_id)
        .bind(code.user_id)
        .bind(&code.subject)
        .bind(&code.redirect_uri)
        .bind(&code.scopes)
        .bind(code.created_at)
        .bind(code.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        application_id: i64,
        code: &str,
    ) -> Result<Option<AuthorizationCode>> {
        // A single DELETE .. RETURNING makes consumption exactly-once.
        let row = sqlx::query(
            "DELETE FROM authorization_codes WHERE code = $1 AND application_id = $2 RETURNING *",
        )
        .bind(code)
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        match row {
            Some(row) => {
                let code = Self::row_to_authorization_code(&row)?;
                Ok(Some(code).filter(|code| code.expires_at > Utc::now()))
            }
            None => Ok(None),
        }
    }
}
