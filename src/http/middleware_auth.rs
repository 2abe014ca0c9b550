//! Principal detection middleware and guard extractors.
//!
//! The `detect_*` middleware resolve credentials into a [`Principal`] stored in
//! the request extensions. They never reject a request for lacking
//! credentials; that is left to the [`CurrentUser`] and [`CurrentClient`]
//! extractors on the handlers that need them.

use axum::body::{Body, to_bytes};
use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::request::Parts;

use crate::errors::OAuthError;
use crate::http::AppState;
use crate::oauth::resolver::{Detector, require_client, require_user};
use crate::oauth::types::{Application, FormParams, Principal, User};

/// Largest form body buffered for inline client credentials
const MAX_FORM_BYTES: usize = 64 * 1024;

/// Users via bearer tokens or basic credentials
pub async fn detect_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
    detect(state, Detector::User, request, next).await
}

/// Users via bearer tokens only
pub async fn detect_bearer_user(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    detect(state, Detector::BearerUser, request, next).await
}

/// Users via basic credentials only
pub async fn detect_basic_user(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    detect(state, Detector::BasicUser, request, next).await
}

/// Applications via basic credentials or inline `client_id`/`client_secret`
/// form fields.
pub async fn detect_client(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "failed to buffer request body");
            return OAuthError::invalid_request("could not read request body").into_response();
        }
    };

    let form = is_form(&parts).then(|| FormParams::parse(&bytes));
    let request = Request::from_parts(parts, Body::from(bytes));

    attach(state, Detector::Client, request, form, next).await
}

async fn detect(state: AppState, detector: Detector, request: Request, next: Next) -> Response {
    attach(state, detector, request, None, next).await
}

async fn attach(
    state: AppState,
    detector: Detector,
    mut request: Request,
    form: Option<FormParams>,
    next: Next,
) -> Response {
    let principal = state
        .resolver
        .resolve(
            detector,
            request.headers(),
            request.extensions().get::<Principal>(),
            form.as_ref(),
        )
        .await;

    match principal {
        Ok(Some(principal)) => {
            request.extensions_mut().insert(principal);
        }
        Ok(None) => {}
        Err(err) => {
            tracing::debug!(?detector, error = %err, "principal detection failed");
            return err.into_response();
        }
    }

    next.run(request).await
}

fn is_form(parts: &Parts) -> bool {
    parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

/// Authenticated user guard
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = OAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_user(parts.extensions.get::<Principal>()).map(|user| CurrentUser(user.clone()))
    }
}

/// Authenticated client application guard
#[derive(Clone, Debug)]
pub struct CurrentClient(pub Application);

impl<S> FromRequestParts<S> for CurrentClient
where
    S: Send + Sync,
{
    type Rejection = OAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_client(parts.extensions.get::<Principal>())
            .map(|application| CurrentClient(application.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::oauth::TokenCodec;
    use crate::storage::{MemoryCredentialStore, UserStore};
    use axum::{Json, Router, middleware, routing::get};
    use base64::{Engine, prelude::BASE64_STANDARD};
    use http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn state() -> AppState {
        let store = Arc::new(MemoryCredentialStore::new().with_hash_cost(4));
        store.create_user("u@x.com", "hunter2").await.unwrap();
        let codec = TokenCodec::from_pem(
            include_bytes!("../../tests/fixtures/registrar.rsa"),
            include_bytes!("../../tests/fixtures/registrar.rsa.pub"),
            "https://auth.example.com",
        )
        .unwrap();
        let config = Config {
            version: "test".to_string(),
            http_port: "8080".to_string().try_into().unwrap(),
            external_base: "https://auth.example.com".to_string().try_into().unwrap(),
            openid_issuer: "https://auth.example.com".to_string(),
            jwt_keys: Default::default(),
            storage_backend: "memory".to_string(),
            database_url: None,
            database_pool_size: "".to_string().try_into().unwrap(),
            cors_allowed_origins: None.try_into().unwrap(),
            default_permitted_scopes: None.into(),
        };
        AppState::new(Arc::new(config), store, Arc::new(codec))
    }

    async fn whoami(CurrentUser(user): CurrentUser) -> Json<User> {
        Json(user)
    }

    async fn status(router: Router, authorization: String) -> StatusCode {
        router
            .oneshot(
                Request::get("/whoami")
                    .header(http::header::AUTHORIZATION, authorization)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_detectors_only_accept_their_schemes() {
        let state = state().await;
        let token = state.codec.sign("cid", "u@x.com", 60).unwrap();
        let basic = format!("Basic {}", BASE64_STANDARD.encode("u@x.com:hunter2"));
        let bearer = format!("Bearer {}", token);

        let bearer_only = Router::new()
            .route("/whoami", get(whoami))
            .route_layer(middleware::from_fn_with_state(state.clone(), detect_bearer_user))
            .with_state(state.clone());
        assert_eq!(status(bearer_only.clone(), bearer.clone()).await, StatusCode::OK);
        assert_eq!(
            status(bearer_only, basic.clone()).await,
            StatusCode::BAD_REQUEST
        );

        let basic_only = Router::new()
            .route("/whoami", get(whoami))
            .route_layer(middleware::from_fn_with_state(state.clone(), detect_basic_user))
            .with_state(state);
        assert_eq!(status(basic_only.clone(), basic).await, StatusCode::OK);
        assert_eq!(status(basic_only, bearer).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_attached_principal_survives_second_detector() {
        let state = state().await;
        let basic = format!("Basic {}", BASE64_STANDARD.encode("u@x.com:hunter2"));

        // The outer layer runs first and attaches the user; the inner
        // bearer-only detector must not reject the basic header afterwards.
        let router = Router::new()
            .route("/whoami", get(whoami))
            .route_layer(middleware::from_fn_with_state(state.clone(), detect_bearer_user))
            .route_layer(middleware::from_fn_with_state(state.clone(), detect_basic_user))
            .with_state(state);
        assert_eq!(status(router, basic).await, StatusCode::OK);
    }
}
