//! Core domain types: principals, grants, token responses, and form parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::errors::OAuthError;

/// An end user. Email is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
}

/// A registered OAuth client application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub client_type: ClientType,
    /// Public client identifier
    pub client_id: String,
    /// Plain secret, only present on the value returned by creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip)]
    pub hashed_client_secret: String,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when registering an application
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewApplication {
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub logo: Option<String>,
    #[serde(default)]
    pub client_type: ClientType,
}

/// Whether an application holds a secret
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Secret,
    Public,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Secret => "secret",
            ClientType::Public => "public",
        }
    }
}

impl TryFrom<&str> for ClientType {
    type Error = OAuthError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        [ClientType::Secret, ClientType::Public]
            .into_iter()
            .find(|client_type| client_type.as_str() == value)
            .ok_or_else(|| {
                OAuthError::invalid_request(format!("unsupported client type {:?}", value))
            })
    }
}

/// The authenticated actor attached to a request
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Principal {
    User(User),
    Application(Application),
}

impl Principal {
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Application(_) => None,
        }
    }

    pub fn as_application(&self) -> Option<&Application> {
        match self {
            Principal::Application(application) => Some(application),
            Principal::User(_) => None,
        }
    }
}

/// Raw credential extracted from a request, never persisted
#[derive(Clone)]
pub enum Credential {
    Basic { id: String, secret: String },
    Bearer(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Basic { id, .. } => f
                .debug_struct("Basic")
                .field("id", id)
                .field("secret", &"<redacted>")
                .finish(),
            Credential::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// OAuth 2.0 grant types served by the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    Password,
    RefreshToken,
}

impl GrantType {
    pub const ALL: [GrantType; 4] = [
        GrantType::AuthorizationCode,
        GrantType::ClientCredentials,
        GrantType::Password,
        GrantType::RefreshToken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl TryFrom<&str> for GrantType {
    type Error = OAuthError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        GrantType::ALL
            .into_iter()
            .find(|grant| grant.as_str() == value)
            .ok_or_else(|| {
                OAuthError::unsupported_grant_type(format!("unsupported grant type {:?}", value))
            })
    }
}

/// Successful token endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn bearer(access_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: Some(expires_in),
            refresh_token: None,
            scope: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    /// Empty scope strings are omitted.
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope.filter(|s| !s.is_empty());
        self
    }
}

/// Single-use authorization code bound to a client, a user and a redirect URI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub application_id: i64,
    pub user_id: i64,
    /// Email of the user, used as the token subject
    pub subject: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Owner and granted scopes of a live refresh token
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    pub user: User,
    pub scopes: Vec<String>,
}

/// Form encoded request body with "exactly one value" accessors.
#[derive(Debug, Clone, Default)]
pub struct FormParams(HashMap<String, Vec<String>>);

impl FormParams {
    pub fn parse(body: &[u8]) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            values
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        Self(values)
    }

    /// Returns `None` when the field is absent or empty.
    pub fn optional(&self, key: &str) -> Result<Option<&str>, OAuthError> {
        match self.0.get(key).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([value]) if value.is_empty() => Ok(None),
            Some([value]) => Ok(Some(value.as_str())),
            Some(_) => Err(OAuthError::invalid_request(format!(
                "multiple parameters for {:?}",
                key
            ))),
        }
    }

    pub fn required(&self, key: &str) -> Result<&str, OAuthError> {
        self.optional(key)?.ok_or_else(|| {
            OAuthError::invalid_request(format!("missing required parameter {:?}", key))
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in iter {
            values.entry(key.into()).or_default().push(value.into());
        }
        Self(values)
    }
}

/// Generate a 256-bit random token, hex encoded
pub fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Parse space-separated scopes
pub fn parse_scope(scope: &str) -> HashSet<String> {
    scope.split_whitespace().map(|s| s.to_string()).collect()
}

/// Join scopes into a space-separated string
pub fn join_scopes<'a>(scopes: impl IntoIterator<Item = &'a String>) -> String {
    let mut scopes: Vec<_> = scopes.into_iter().collect();
    scopes.sort();
    scopes.dedup();
    scopes
        .into_iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}
