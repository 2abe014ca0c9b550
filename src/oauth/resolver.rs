//! Principal resolution from `Authorization` headers and inline client credentials.
//!
//! A [`Detector`] selects which schemes are accepted and what each resolves
//! to. Resolution yields at most one principal per request and never replaces
//! a principal that is already attached.

use std::sync::Arc;

use anyhow::anyhow;
use base64::{Engine, prelude::BASE64_STANDARD};
use http::HeaderMap;
use http::header::AUTHORIZATION;

use crate::errors::OAuthError;
use crate::oauth::token::TokenCodec;
use crate::oauth::types::{Application, Credential, FormParams, Principal, User};
use crate::storage::traits::CredentialStore;

/// Scheme registries exposed to the HTTP layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detector {
    /// Users via bearer tokens or basic credentials
    User,
    /// Users via bearer tokens only
    BearerUser,
    /// Users via basic credentials only
    BasicUser,
    /// Applications via basic credentials, falling back to inline form fields
    Client,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Finder {
    UserByBearer,
    UserByBasic,
    ClientByBasic,
}

impl Detector {
    /// `scheme` is already lowercased.
    fn finder(&self, scheme: &str) -> Option<Finder> {
        match (self, scheme) {
            (Detector::User | Detector::BearerUser, "bearer") => Some(Finder::UserByBearer),
            (Detector::User | Detector::BasicUser, "basic") => Some(Finder::UserByBasic),
            (Detector::Client, "basic") => Some(Finder::ClientByBasic),
            _ => None,
        }
    }
}

/// Turns request credentials into a [`Principal`].
pub struct PrincipalResolver {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
}

impl PrincipalResolver {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    /// Resolve the principal for a request.
    ///
    /// Returns `Ok(None)` when no credential was offered. `attached` is the
    /// principal set by an earlier stage; it is returned unchanged.
    pub async fn resolve(
        &self,
        detector: Detector,
        headers: &HeaderMap,
        attached: Option<&Principal>,
        form: Option<&FormParams>,
    ) -> Result<Option<Principal>, OAuthError> {
        if let Some(principal) = attached {
            return Ok(Some(principal.clone()));
        }

        if let Some(principal) = self.resolve_header(detector, headers).await? {
            return Ok(Some(principal));
        }

        match (detector, form) {
            (Detector::Client, Some(form)) => self.resolve_inline_client(form).await,
            _ => Ok(None),
        }
    }

    async fn resolve_header(
        &self,
        detector: Detector,
        headers: &HeaderMap,
    ) -> Result<Option<Principal>, OAuthError> {
        let mut values = headers.get_all(AUTHORIZATION).iter();
        let Some(value) = values.next() else {
            return Ok(None);
        };
        if values.next().is_some() {
            return Err(OAuthError::invalid_request("multiple authorization headers"));
        }

        let value = value
            .to_str()
            .map_err(|_| OAuthError::invalid_request("invalid authorization header format"))?;

        let (scheme, token) = match value.split(' ').collect::<Vec<_>>().as_slice() {
            [scheme, token] => (scheme.to_ascii_lowercase(), *token),
            [_] => {
                tracing::debug!("ignoring authorization header without a scheme");
                return Ok(None);
            }
            _ => {
                return Err(OAuthError::invalid_request(
                    "invalid authorization header format",
                ));
            }
        };

        let finder = detector
            .finder(&scheme)
            .ok_or_else(|| OAuthError::invalid_request("unsupported authorization scheme"))?;

        match self.find(finder, token).await {
            Ok(principal) => Ok(Some(principal)),
            Err(err) => match err.downcast::<OAuthError>() {
                Ok(protocol) => Err(protocol),
                Err(err) => {
                    tracing::debug!(?finder, error = ?err, "credential lookup failed");
                    Err(OAuthError::access_denied("invalid credentials"))
                }
            },
        }
    }

    async fn find(&self, finder: Finder, token: &str) -> anyhow::Result<Principal> {
        let credential = match finder {
            Finder::UserByBearer => Credential::Bearer(token.to_string()),
            Finder::UserByBasic | Finder::ClientByBasic => parse_basic(token)?,
        };

        match (finder, credential) {
            (Finder::UserByBearer, Credential::Bearer(token)) => {
                let claims = self.codec.verify(&token)?;
                // Client credentials tokens carry the client id as subject.
                if claims.sub == claims.aud {
                    return Err(anyhow!("token was issued to a client, not a user"));
                }
                self.store
                    .find_user_by_email(&claims.sub)
                    .await?
                    .map(Principal::User)
                    .ok_or_else(|| anyhow!("no user for token subject"))
            }
            (Finder::UserByBasic, Credential::Basic { id, secret }) => self
                .store
                .find_user_by_credentials(&id, &secret)
                .await?
                .map(Principal::User)
                .ok_or_else(|| anyhow!("no user matches credentials")),
            (Finder::ClientByBasic, Credential::Basic { id, secret }) => self
                .store
                .find_application_by_credentials(&id, &secret)
                .await?
                .map(Principal::Application)
                .ok_or_else(|| anyhow!("no application matches credentials")),
            (finder, credential) => Err(anyhow!("{:?} cannot use {:?}", finder, credential)),
        }
    }

    /// Inline `client_id`/`client_secret` fields. Failed lookups leave the request unauthenticated.
    async fn resolve_inline_client(
        &self,
        form: &FormParams,
    ) -> Result<Option<Principal>, OAuthError> {
        let (Some(client_id), Some(client_secret)) =
            (form.optional("client_id")?, form.optional("client_secret")?)
        else {
            return Ok(None);
        };

        match self
            .store
            .find_application_by_credentials(client_id, client_secret)
            .await
        {
            Ok(application) => Ok(application.map(Principal::Application)),
            Err(err) => {
                tracing::warn!(error = ?err, "inline client lookup failed");
                Ok(None)
            }
        }
    }
}

/// Decode a basic payload, splitting `id:secret` on the first colon.
pub fn parse_basic(payload: &str) -> Result<Credential, OAuthError> {
    let invalid = || OAuthError::invalid_request("invalid basic credentials");

    let decoded = BASE64_STANDARD.decode(payload).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (id, secret) = decoded.split_once(':').ok_or_else(invalid)?;

    Ok(Credential::Basic {
        id: id.to_string(),
        secret: secret.to_string(),
    })
}

/// Require an authenticated user.
pub fn require_user(principal: Option<&Principal>) -> Result<&User, OAuthError> {
    principal
        .and_then(Principal::as_user)
        .ok_or_else(|| OAuthError::access_denied("authentication required"))
}

/// Require an authenticated application.
pub fn require_client(
    principal: Option<&Principal>,
) -> Result<&Application, OAuthError> {
    principal
        .and_then(Principal::as_application)
        .ok_or_else(|| OAuthError::access_denied("authentication required"))
}
