//! Handles GET/POST /authorize

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    response::{IntoResponse, Json, Redirect, Response},
};

use super::context::AppState;
use crate::errors::OAuthError;
use crate::http::middleware_auth::CurrentUser;
use crate::oauth::AuthorizationRequest;
use crate::oauth::types::{FormParams, User};

/// GET /authorize
pub async fn handle_authorize_query(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    RawQuery(query): RawQuery,
) -> Result<Response, OAuthError> {
    let params = FormParams::parse(query.unwrap_or_default().as_bytes());
    authorize(&state, user, &params).await
}

/// POST /authorize
pub async fn handle_authorize_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Result<Response, OAuthError> {
    authorize(&state, user, &FormParams::parse(&body)).await
}

/// Without a `response_type` the request only confirms who is signed in and
/// the user is returned. With one, an authorization code is issued and the
/// user agent is redirected back to the client.
async fn authorize(
    state: &AppState,
    user: User,
    params: &FormParams,
) -> Result<Response, OAuthError> {
    if !params.contains("response_type") {
        return Ok(Json(user).into_response());
    }

    let request = AuthorizationRequest::try_from(params)?;
    let location = state.auth_server.authorize(&user, &request).await?;

    Ok(Redirect::to(&location).into_response())
}
