//! Handles client application registration and lookup

use axum::{body::Bytes, extract::State, response::Json};

use super::context::AppState;
use crate::errors::{HttpError, Result};
use crate::http::middleware_auth::CurrentClient;
use crate::oauth::types::{Application, ClientType, FormParams, NewApplication};

/// GET /client
///
/// Returns the application authenticated by the request.
pub async fn handle_client(CurrentClient(client): CurrentClient) -> Json<Application> {
    Json(client)
}

/// POST /clients
///
/// Registers an application from a form encoded `name` (plus optional
/// `description`, `website`, `logo` and `client_type`). The response is the
/// only place the plain client secret is ever returned.
///
/// New applications are permitted the configured default scopes.
pub async fn handle_create_client(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Application>> {
    let params = FormParams::parse(&body);

    let application = NewApplication {
        name: params.required("name")?.to_string(),
        description: params.optional("description")?.map(str::to_string),
        website: params.optional("website")?.map(str::to_string),
        logo: params.optional("logo")?.map(str::to_string),
        client_type: params
            .optional("client_type")?
            .map(ClientType::try_from)
            .transpose()?
            .unwrap_or_default(),
    };

    let created = state
        .store
        .create_application(&application)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to create application");
            HttpError::Unexpected(e.into())
        })?;

    let default_scopes = state.config.default_permitted_scopes.as_ref();
    if !default_scopes.is_empty() {
        state
            .store
            .permit_scopes(created.id, default_scopes)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, client_id = %created.client_id, "failed to permit default scopes");
                HttpError::Unexpected(e.into())
            })?;
    }

    tracing::info!(client_id = %created.client_id, name = %created.name, "registered application");
    Ok(Json(created))
}
