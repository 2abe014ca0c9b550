//! Trait-based credential storage with in-memory and PostgreSQL backends.

pub mod inmemory;
pub mod traits;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export commonly used types and traits
pub use inmemory::MemoryCredentialStore;
pub use traits::*;

#[cfg(feature = "postgres")]
pub use postgres::PostgresCredentialStore;

use crate::errors::StorageError;
use std::sync::Arc;

/// Storage backend configuration and factory
#[derive(Clone, Debug, PartialEq)]
pub enum StorageBackend {
    Memory,
    #[cfg(feature = "postgres")]
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

/// Create a storage backend based on configuration
pub async fn create_storage_backend(
    backend: StorageBackend,
) -> std::result::Result<Arc<dyn CredentialStore>, StorageError> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryCredentialStore::new())),
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(&database_url)
                .await
                .map_err(|e| {
                    StorageError::ConnectionFailed(format!("PostgreSQL connection failed: {}", e))
                })?;

            let storage = postgres::PostgresCredentialStore::new(pool);

            // Run migrations
            storage.migrate().await?;

            Ok(Arc::new(storage))
        }
    }
}

/// Parse storage backend from configuration string
pub fn parse_storage_backend(
    backend_name: &str,
    database_url: Option<&str>,
    max_connections: u32,
) -> std::result::Result<StorageBackend, StorageError> {
    match backend_name {
        "memory" => Ok(StorageBackend::Memory),
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = database_url.ok_or_else(|| {
                StorageError::InvalidData("DATABASE_URL required for postgres backend".to_string())
            })?;
            Ok(StorageBackend::Postgres {
                database_url: url.to_string(),
                max_connections,
            })
        }
        _ => {
            let _ = (database_url, max_connections);
            Err(StorageError::InvalidData(format!(
                "Unknown storage backend: {}",
                backend_name
            )))
        }
    }
}
