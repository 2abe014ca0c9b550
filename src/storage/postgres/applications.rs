//! PostgreSQL implementation for application storage

use crate::errors::StorageError;
use crate::oauth::types::{Application, ClientType, NewApplication, generate_token};
use crate::storage::traits::{ApplicationStore, Result, hash_secret, verify_secret};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

/// PostgreSQL implementation of application storage
pub struct PostgresApplicationStore {
    pool: PgPool,
    hash_cost: u32,
}

impl PostgresApplicationStore {
    /// Create a new PostgreSQL application store
    pub fn new(pool: PgPool, hash_cost: u32) -> Self {
        Self { pool, hash_cost }
    }

    /// Convert PostgreSQL row to Application
    fn row_to_application(row: &PgRow) -> Result<Application> {
        let get = |name: &str, e: sqlx::Error| {
            StorageError::DatabaseError(format!("Failed to get {}: {}", name, e))
        };

        let client_type: String = row.try_get("client_type").map_err(|e| get("client_type", e))?;
        let client_type = ClientType::try_from(client_type.as_str())
            .map_err(|e| StorageError::InvalidData(e.description))?;

        Ok(Application {
            id: row.try_get("id").map_err(|e| get("id", e))?,
            name: row.try_get("name").map_err(|e| get("name", e))?,
            description: row.try_get("description").map_err(|e| get("description", e))?,
            website: row.try_get("website").map_err(|e| get("website", e))?,
            logo: row.try_get("logo").map_err(|e| get("logo", e))?,
            client_type,
            client_id: row.try_get("client_id").map_err(|e| get("client_id", e))?,
            client_secret: None,
            hashed_client_secret: row
                .try_get("client_secret_hash")
                .map_err(|e| get("client_secret_hash", e))?,
            created_at: row.try_get("created_at").map_err(|e| get("created_at", e))?,
        })
    }
}

#[async_trait]
impl ApplicationStore for PostgresApplicationStore {
    async fn create_application(&self, application: &NewApplication) -> Result<Application> {
        let client_id = generate_token();
        let client_secret = generate_token();
        let client_secret_hash = hash_secret(&client_secret, self.hash_cost).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO applications
                (name, description, website, logo, client_type, client_id, client_secret_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&application.name)
        .bind(&application.description)
        .bind(&application.website)
        .bind(&application.logo)
        .bind(application.client_type.as_str())
        .bind(&client_id)
        .bind(&client_secret_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::NotUnique("client_id".to_string())
            }
            e => StorageError::DatabaseError(e.to_string()),
        })?;

        let mut created = Self::row_to_application(&row)?;
        created.client_secret = Some(client_secret);
        Ok(created)
    }

    async fn find_application_by_client_id(&self, client_id: &str) -> Result<Option<Application>> {
        let row = sqlx::query("SELECT * FROM applications WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        row.as_ref().map(Self::row_to_application).transpose()
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
        let rows = sqlx::query(
            r#"
            SELECT s.name FROM scopes s
            JOIN permitted_scopes p ON p.scope_id = s.id
            WHERE p.application_id = $1
            ORDER BY s.name
            "#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get("name")
                    .map_err(|e| StorageError::DatabaseError(format!("Failed to get name: {}", e)))
            })
            .collect()
    }

    async fn permit_scopes(&self, application_id: i64, scopes: &[String]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        for scope in scopes {
            let scope_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO scopes (name) VALUES ($1)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(scope)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO permitted_scopes (application_id, scope_id) VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(application_id)
            .bind(scope_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
