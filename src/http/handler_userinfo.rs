//! Handles GET /userinfo and POST /logout

use axum::response::Json;
use serde::Serialize;

use crate::http::middleware_auth::CurrentUser;
use crate::oauth::types::User;

/// Claims about the authenticated user
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    /// Same subject the access tokens are issued for
    pub sub: String,
}

/// GET /userinfo
pub async fn handle_userinfo(CurrentUser(user): CurrentUser) -> Json<UserInfo> {
    Json(UserInfo {
        id: user.id,
        sub: user.email.clone(),
        email: user.email,
    })
}

/// POST /logout
///
/// Access tokens are stateless, so there is nothing to revoke here; the
/// authenticated user is echoed back.
pub async fn handle_logout(CurrentUser(user): CurrentUser) -> Json<User> {
    tracing::debug!(user_id = user.id, "logout");
    Json(user)
}
