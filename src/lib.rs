//! Registrar: an OAuth 2.0 / OpenID Connect style authorization server.
//!
//! Authenticates users and client applications, issues RS256 signed access
//! tokens, and serves the authorization code, client credentials, password,
//! and refresh token grants.

pub mod config;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
