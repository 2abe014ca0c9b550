//! Handles GET /.well-known/openid-configuration

use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use super::context::AppState;
use crate::oauth::types::GrantType;

/// OpenID Connect Configuration handler
/// GET /.well-known/openid-configuration
///
/// Endpoints are derived from the configured external base URL.
pub async fn openid_configuration_handler(State(state): State<AppState>) -> Json<Value> {
    let base = state.config.external_base.as_ref();
    let grant_types: Vec<&str> = GrantType::ALL.iter().map(GrantType::as_str).collect();

    Json(json!({
        "issuer": state.config.openid_issuer,
        "authorization_endpoint": format!("{}/authorize", base),
        "token_endpoint": format!("{}/token", base),
        "userinfo_endpoint": format!("{}/userinfo", base),
        "scopes_supported": ["openid", "email", "profile"],
        "response_types_supported": ["code"],
        "response_modes_supported": ["query"],
        "grant_types_supported": grant_types,
        "id_token_signing_alg_values_supported": ["RS256"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
        "subject_types_supported": ["public"],
        "claims_supported": ["aud", "email", "exp", "iat", "iss", "sub"],
    }))
}
