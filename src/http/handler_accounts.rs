//! Handles POST /accounts - user signup

use std::collections::BTreeMap;

use axum::{body::Bytes, extract::State, http::StatusCode, response::Json};
use serde::Deserialize;
use serde_json::json;

use super::context::AppState;
use crate::errors::{HttpError, OAuthError, Result, StorageError};
use crate::oauth::types::User;

#[derive(Debug, Default, Deserialize)]
pub struct CreateAccount {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl CreateAccount {
    /// Field name to validation messages; empty when valid.
    fn validate(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        let mut fields = BTreeMap::new();
        if self.email.is_empty() {
            fields.insert("email", vec!["must provide a email"]);
        } else if !is_email(&self.email) {
            fields.insert("email", vec!["must provide a valid email"]);
        }
        if self.password.is_empty() {
            fields.insert("password", vec!["must provide a password"]);
        }
        fields
    }
}

/// `local@domain` with no whitespace and a dotted domain
fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() > 1
                && domain.split('.').all(|label| !label.is_empty())
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn validation_failed(fields: serde_json::Value) -> OAuthError {
    OAuthError::invalid_request("validation failed").with_metadata("fields", fields)
}

/// POST /accounts
pub async fn handle_create_account(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<User>> {
    let params: CreateAccount =
        serde_json::from_slice(&body).map_err(|e| OAuthError::invalid_request(e.to_string()))?;

    let fields = params.validate();
    if !fields.is_empty() {
        return Err(validation_failed(json!(fields)).into());
    }

    match state.store.create_user(&params.email, &params.password).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, "created account");
            Ok(Json(user))
        }
        Err(StorageError::NotUnique(_)) => Err(validation_failed(json!({
            "email": ["email address taken"],
        }))
        .into()),
        Err(e) => {
            tracing::error!(error = %e, "failed to create account");
            Err(HttpError::Unexpected(e.into()))
        }
    }
}

/// OPTIONS /accounts
///
/// CORS headers are added by the router's CORS layer.
pub async fn handle_accounts_options() -> StatusCode {
    StatusCode::OK
}
