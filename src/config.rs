//! Environment-based configuration types for registrar server runtime settings.

use anyhow::Result;

use crate::errors::ConfigError;

/// HTTP server port configuration
#[derive(Clone)]
pub struct HttpPort(u16);

/// Public base URL of the server, without a trailing slash
#[derive(Clone)]
pub struct ExternalBase(String);

/// Maximum number of pooled database connections
#[derive(Clone)]
pub struct DatabasePoolSize(u32);

/// Origins allowed by the CORS layer; empty means any origin
#[derive(Clone, Default)]
pub struct CorsAllowedOrigins(Vec<String>);

/// Scopes permitted to every newly registered application
#[derive(Clone, Default)]
pub struct DefaultPermittedScopes(Vec<String>);

/// Paths of the PEM encoded RSA signing and verification keys
#[derive(Clone, Default)]
pub struct JwtKeyPaths {
    pub private_key: String,
    pub public_key: String,
}

/// PEM bytes read from [`JwtKeyPaths`]
pub struct KeyMaterial {
    pub private_pem: Vec<u8>,
    pub public_pem: Vec<u8>,
}

/// Main application configuration
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub external_base: ExternalBase,
    pub openid_issuer: String,
    pub jwt_keys: JwtKeyPaths,
    pub storage_backend: String,
    pub database_url: Option<String>,
    pub database_pool_size: DatabasePoolSize,
    pub cors_allowed_origins: CorsAllowedOrigins,
    pub default_permitted_scopes: DefaultPermittedScopes,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let external_base: ExternalBase = require_env("EXTERNAL_BASE")?.try_into()?;
        let openid_issuer =
            optional_env("OPENID_ISSUER").unwrap_or_else(|| external_base.as_ref().clone());
        let jwt_keys = JwtKeyPaths {
            private_key: require_env("JWT_PRIVATE_KEY")?,
            public_key: require_env("JWT_PUBLIC_KEY")?,
        };
        let storage_backend = default_env("STORAGE_BACKEND", "memory");
        let database_url = optional_env("DATABASE_URL");
        let database_pool_size: DatabasePoolSize =
            default_env("DATABASE_POOL_SIZE", "10").try_into()?;
        let cors_allowed_origins: CorsAllowedOrigins =
            optional_env("CORS_ALLOWED_ORIGINS").try_into()?;
        let default_permitted_scopes: DefaultPermittedScopes =
            optional_env("DEFAULT_PERMITTED_SCOPES").into();

        Ok(Self {
            version: version()?,
            http_port,
            external_base,
            openid_issuer,
            jwt_keys,
            storage_backend,
            database_url,
            database_pool_size,
            cors_allowed_origins,
            default_permitted_scopes,
        })
    }

    /// Read the configured key files
    pub fn load_key_material(&self) -> Result<KeyMaterial> {
        let read = |path: &str| {
            std::fs::read(path).map_err(|e| ConfigError::KeyFileUnreadable(path.to_string(), e))
        };
        Ok(KeyMaterial {
            private_pem: read(&self.jwt_keys.private_key)?,
            public_pem: read(&self.jwt_keys.public_key)?,
        })
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired(name.to_string()).into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for ExternalBase {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        url::Url::parse(&value).map_err(|e| ConfigError::InvalidExternalBase(value.clone(), e))?;
        Ok(Self(value.trim_end_matches('/').to_string()))
    }
}

impl AsRef<String> for ExternalBase {
    fn as_ref(&self) -> &String {
        &self.0
    }
}

impl TryFrom<String> for DatabasePoolSize {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self(10));
        }
        value
            .parse::<u32>()
            .map(Self)
            .map_err(ConfigError::PoolSizeParsingFailed)
    }
}

impl AsRef<u32> for DatabasePoolSize {
    fn as_ref(&self) -> &u32 {
        &self.0
    }
}

impl TryFrom<Option<String>> for CorsAllowedOrigins {
    type Error = anyhow::Error;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        let value = value.unwrap_or_default();
        Ok(Self(
            value
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        ))
    }
}

impl AsRef<Vec<String>> for CorsAllowedOrigins {
    fn as_ref(&self) -> &Vec<String> {
        &self.0
    }
}

impl From<Option<String>> for DefaultPermittedScopes {
    /// Space or comma separated scope names
    fn from(value: Option<String>) -> Self {
        let mut scopes: Vec<String> = value
            .unwrap_or_default()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        scopes.sort();
        scopes.dedup();
        Self(scopes)
    }
}

impl AsRef<Vec<String>> for DefaultPermittedScopes {
    fn as_ref(&self) -> &Vec<String> {
        &self.0
    }
}
