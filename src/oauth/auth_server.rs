//! Grant engine: token issuance for the four supported grant types, plus
//! authorization code issuance for `/authorize`.

use crate::errors::{OAuthError, StorageError};
use crate::oauth::token::TokenCodec;
use crate::oauth::types::*;
use crate::storage::CredentialStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use url::Url;

/// Access token lifetime in seconds
pub const ACCESS_TOKEN_LIFETIME: u64 = 3600;

const AUTHORIZE_FAILED: &str = "could not authorize client";
const INVALID_CODE: &str = "authorization code is invalid or expired";
const INVALID_REFRESH_TOKEN: &str = "refresh token is invalid or expired";

/// Query or form parameters of an authorization request
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRequest {
    pub response_type: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
}

impl TryFrom<&FormParams> for AuthorizationRequest {
    type Error = OAuthError;

    fn try_from(params: &FormParams) -> Result<Self, Self::Error> {
        let owned = |value: Option<&str>| value.map(str::to_string);
        Ok(Self {
            response_type: owned(params.optional("response_type")?),
            client_id: params.required("client_id")?.to_string(),
            redirect_uri: params.required("redirect_uri")?.to_string(),
            scope: owned(params.optional("scope")?),
            state: owned(params.optional("state")?),
        })
    }
}

pub struct AuthorizationServer {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    access_token_lifetime: u64,
    /// Authorization code lifetime
    auth_code_lifetime: Duration,
}

impl AuthorizationServer {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>) -> Self {
        Self {
            store,
            codec,
            access_token_lifetime: ACCESS_TOKEN_LIFETIME,
            auth_code_lifetime: Duration::minutes(10),
        }
    }

    /// Issue an authorization code for an authenticated user and return the
    /// redirect URL carrying it.
    pub async fn authorize(
        &self,
        user: &User,
        request: &AuthorizationRequest,
    ) -> Result<String, OAuthError> {
        match request.response_type.as_deref() {
            Some("code") => {}
            other => {
                return Err(OAuthError::invalid_request(format!(
                    "unsupported response type {:?}",
                    other.unwrap_or_default()
                )));
            }
        }

        let client = self
            .store
            .find_application_by_client_id(&request.client_id)
            .await
            .map_err(storage_failure)?
            .ok_or_else(|| OAuthError::invalid_request("unknown client"))?;

        let mut redirect = Url::parse(&request.redirect_uri)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| OAuthError::invalid_request("invalid redirect uri"))?;

        let requested = parse_scope(request.scope.as_deref().unwrap_or_default());
        self.ensure_permitted(&client, &requested).await?;

        let now = Utc::now();
        let code = AuthorizationCode {
            code: generate_token(),
            application_id: client.id,
            user_id: user.id,
            subject: user.email.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scopes: {
                let mut scopes: Vec<String> = requested.into_iter().collect();
                scopes.sort();
                scopes
            },
            created_at: now,
            expires_at: now + self.auth_code_lifetime,
        };

        self.store
            .store_authorization_code(&code)
            .await
            .map_err(storage_failure)?;

        tracing::debug!(client_id = %client.client_id, user_id = user.id, "issued authorization code");

        {
            let mut query = redirect.query_pairs_mut();
            query.append_pair("code", &code.code);
            if let Some(state) = request.state.as_deref().filter(|s| !s.is_empty()) {
                query.append_pair("state", state);
            }
        }

        Ok(redirect.into())
    }

    /// Handle a token request for an already authenticated client
    pub async fn token(
        &self,
        client: &Application,
        params: &FormParams,
    ) -> Result<TokenResponse, OAuthError> {
        let grant_type = GrantType::try_from(params.required("grant_type")?)?;

        match grant_type {
            GrantType::AuthorizationCode => {
                self.handle_authorization_code_grant(client, params).await
            }
            GrantType::ClientCredentials => {
                self.handle_client_credentials_grant(client, params).await
            }
            GrantType::Password => self.handle_password_grant(client, params).await,
            GrantType::RefreshToken => self.handle_refresh_token_grant(client, params).await,
        }
    }

    async fn handle_authorization_code_grant(
        &self,
        client: &Application,
        params: &FormParams,
    ) -> Result<TokenResponse, OAuthError> {
        let code = params.required("code")?;
        let redirect_uri = params.required("redirect_uri")?;

        let stored = self
            .store
            .consume_authorization_code(client.id, code)
            .await
            .map_err(storage_failure)?;

        let stored = match stored {
            Some(stored) if stored.redirect_uri == redirect_uri => stored,
            Some(_) => {
                tracing::warn!(client_id = %client.client_id, "authorization code redirect uri mismatch");
                return Err(OAuthError::invalid_grant(INVALID_CODE));
            }
            None => {
                tracing::warn!(client_id = %client.client_id, "authorization code not found or expired");
                return Err(OAuthError::invalid_grant(INVALID_CODE));
            }
        };

        let access_token = self.sign(client, &stored.subject)?;
        let refresh_token = self
            .store
            .authorize_user(stored.user_id, client.id, &stored.scopes, true)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to persist refresh token");
                OAuthError::internal_server_error(AUTHORIZE_FAILED)
            })?;

        Ok(TokenResponse::bearer(access_token, self.access_token_lifetime)
            .with_refresh_token(refresh_token)
            .with_scope(Some(join_scopes(&stored.scopes))))
    }

    async fn handle_client_credentials_grant(
        &self,
        client: &Application,
        params: &FormParams,
    ) -> Result<TokenResponse, OAuthError> {
        let scope = params.optional("scope")?;
        self.ensure_permitted(client, &parse_scope(scope.unwrap_or_default()))
            .await?;

        let access_token = self.sign(client, &client.client_id)?;

        Ok(TokenResponse::bearer(access_token, self.access_token_lifetime)
            .with_scope(scope.map(str::to_string)))
    }

    async fn handle_password_grant(
        &self,
        client: &Application,
        params: &FormParams,
    ) -> Result<TokenResponse, OAuthError> {
        let username = params.required("username")?;
        let password = params.required("password")?;
        let scope = params.optional("scope")?;

        let user = match self.store.find_user_by_credentials(username, password).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!(client_id = %client.client_id, "password grant rejected");
                return Err(OAuthError::access_denied("invalid username/password"));
            }
            Err(e) => {
                tracing::warn!(error = %e, "password grant lookup failed");
                return Err(OAuthError::access_denied("invalid username/password"));
            }
        };

        let access_token = self.sign(client, &user.email)?;

        // Unpermitted scopes are dropped; the response reports what was granted.
        let permitted = self
            .store
            .permitted_scopes(client.id)
            .await
            .map_err(storage_failure)?;
        let requested = parse_scope(scope.unwrap_or_default());
        let mut scopes: Vec<String> = permitted
            .into_iter()
            .filter(|scope| requested.contains(scope))
            .collect();
        scopes.sort();

        let refresh_token = self
            .store
            .authorize_user(user.id, client.id, &scopes, true)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to persist refresh token");
                OAuthError::internal_server_error(AUTHORIZE_FAILED)
            })?;

        Ok(TokenResponse::bearer(access_token, self.access_token_lifetime)
            .with_refresh_token(refresh_token)
            .with_scope(scope.map(|_| join_scopes(&scopes))))
    }

    async fn handle_refresh_token_grant(
        &self,
        client: &Application,
        params: &FormParams,
    ) -> Result<TokenResponse, OAuthError> {
        let refresh_token = params.required("refresh_token")?;
        let scope = params.optional("scope")?;

        let grant = match self
            .store
            .find_user_by_refresh_token(client.id, refresh_token)
            .await
        {
            Ok(Some(grant)) => grant,
            Ok(None) => {
                tracing::warn!(client_id = %client.client_id, "refresh token not found or expired");
                return Err(OAuthError::invalid_grant(INVALID_REFRESH_TOKEN));
            }
            Err(e) => {
                tracing::warn!(client_id = %client.client_id, error = %e, "refresh token lookup failed");
                return Err(OAuthError::invalid_grant(INVALID_REFRESH_TOKEN));
            }
        };

        // Scopes may only narrow on refresh.
        let scope = match scope {
            None => join_scopes(&grant.scopes),
            Some(scope) => {
                let granted: std::collections::HashSet<String> =
                    grant.scopes.iter().cloned().collect();
                if !parse_scope(scope).is_subset(&granted) {
                    return Err(OAuthError::invalid_request(
                        "requested scope exceeds granted scope",
                    ));
                }
                scope.to_string()
            }
        };

        let access_token = self.sign(client, &grant.user.email)?;

        Ok(TokenResponse::bearer(access_token, self.access_token_lifetime)
            .with_refresh_token(Some(refresh_token.to_string()))
            .with_scope(Some(scope)))
    }

    async fn ensure_permitted(
        &self,
        client: &Application,
        requested: &std::collections::HashSet<String>,
    ) -> Result<(), OAuthError> {
        if requested.is_empty() {
            return Ok(());
        }

        let permitted = self
            .store
            .permitted_scopes(client.id)
            .await
            .map_err(storage_failure)?;

        if requested.iter().all(|scope| permitted.contains(scope)) {
            Ok(())
        } else {
            Err(OAuthError::invalid_request(
                "requested scope exceeds permitted scope",
            ))
        }
    }

    fn sign(&self, client: &Application, subject: &str) -> Result<String, OAuthError> {
        self.codec
            .sign(&client.client_id, subject, self.access_token_lifetime)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to sign access token");
                OAuthError::internal_server_error(AUTHORIZE_FAILED)
            })
    }
}

fn storage_failure(error: StorageError) -> OAuthError {
    tracing::error!(error = %error, "credential store failure");
    OAuthError::internal_server_error(AUTHORIZE_FAILED)
}
