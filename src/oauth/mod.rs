//! OAuth 2.0 core: principal resolution, token codec, and the grant engine.

pub mod auth_server;
pub mod resolver;
pub mod token;
pub mod types;

pub use auth_server::{ACCESS_TOKEN_LIFETIME, AuthorizationRequest, AuthorizationServer};
pub use resolver::{Detector, PrincipalResolver, require_client, require_user};
pub use token::{Claims, TokenCodec};
pub use types::{
    Application, AuthorizationCode, ClientType, Credential, FormParams, GrantType, NewApplication,
    Principal, RefreshGrant, TokenResponse, User, parse_scope,
};
