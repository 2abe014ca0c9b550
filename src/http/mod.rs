//! Axum HTTP server handlers and middleware for the authorization server.

pub mod context;
mod handler_accounts;
mod handler_authorize;
mod handler_clients;
mod handler_token;
mod handler_userinfo;
mod handler_well_known;
pub mod middleware_auth;
pub mod server;

pub use context::AppState;
pub use server::build_router;
