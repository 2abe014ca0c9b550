//! Application state shared by every request handler.

use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Config;
use crate::oauth::{AuthorizationServer, PrincipalResolver, TokenCodec};
use crate::storage::CredentialStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Users, applications, refresh tokens, and authorization codes
    pub store: Arc<dyn CredentialStore>,
    pub codec: Arc<TokenCodec>,
    pub resolver: Arc<PrincipalResolver>,
    pub auth_server: Arc<AuthorizationServer>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>) -> Self {
        Self {
            resolver: Arc::new(PrincipalResolver::new(store.clone(), codec.clone())),
            auth_server: Arc::new(AuthorizationServer::new(store.clone(), codec.clone())),
            config,
            store,
            codec,
        }
    }
}

impl FromRef<AppState> for Arc<dyn CredentialStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.config.clone()
    }
}
