//! Main router configuration assembling the account, client, token, and user endpoints.

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use super::{
    context::AppState,
    handler_accounts::{handle_accounts_options, handle_create_account},
    handler_authorize::{handle_authorize_form, handle_authorize_query},
    handler_clients::{handle_client, handle_create_client},
    handler_token::handle_token,
    handler_userinfo::{handle_logout, handle_userinfo},
    handler_well_known::openid_configuration_handler,
    middleware_auth::{detect_client, detect_user},
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    // Routes authenticated as a client application
    let client_routes = Router::new()
        .route("/client", get(handle_client))
        .route("/token", post(handle_token))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), detect_client));

    // Routes authenticated as a user
    let user_routes = Router::new()
        .route(
            "/authorize",
            get(handle_authorize_query).post(handle_authorize_form),
        )
        .route("/userinfo", get(handle_userinfo))
        .route("/logout", post(handle_logout))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), detect_user));

    Router::new()
        .route(
            "/accounts",
            post(handle_create_account).options(handle_accounts_options),
        )
        .route("/clients", post(handle_create_client))
        .route(
            "/.well-known/openid-configuration",
            get(openid_configuration_handler),
        )
        .merge(client_routes)
        .merge(user_routes)
        .layer(cors_layer(ctx.config.cors_allowed_origins.as_ref()))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Any origin is allowed unless `CORS_ALLOWED_ORIGINS` lists some.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|e| tracing::warn!(%origin, error = %e, "ignoring invalid CORS origin"))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}
