//! Handles POST /token - grant dispatch for an authenticated client

use axum::{body::Bytes, extract::State, http::header, response::IntoResponse, response::Json};

use super::context::AppState;
use crate::errors::OAuthError;
use crate::http::middleware_auth::CurrentClient;
use crate::oauth::types::FormParams;

/// OAuth token endpoint
/// POST /token
///
/// Client authentication has already been done by the client detector; the
/// body is the form encoded grant request.
pub async fn handle_token(
    State(state): State<AppState>,
    CurrentClient(client): CurrentClient,
    body: Bytes,
) -> Result<impl IntoResponse, OAuthError> {
    let params = FormParams::parse(&body);

    let response = state.auth_server.token(&client, &params).await.map_err(|err| {
        tracing::info!(client_id = %client.client_id, error = %err, "token request rejected");
        err
    })?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    ))
}
