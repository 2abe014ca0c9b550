//! End to end tests driving the HTTP router: account and client
//! registration, the four grants, principal detection, and error rendering.

use axum::Router;
use axum::body::{Body, to_bytes};
use base64::{Engine, prelude::BASE64_STANDARD};
use http::{HeaderMap, Request, StatusCode, header};
use registrar::config::Config;
use registrar::http::{AppState, build_router};
use registrar::oauth::TokenCodec;
use registrar::storage::{ApplicationStore, MemoryCredentialStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;

const PRIVATE_KEY: &[u8] = include_bytes!("fixtures/registrar.rsa");
const PUBLIC_KEY: &[u8] = include_bytes!("fixtures/registrar.rsa.pub");
const OTHER_PRIVATE_KEY: &[u8] = include_bytes!("fixtures/other.rsa");
const OTHER_PUBLIC_KEY: &[u8] = include_bytes!("fixtures/other.rsa.pub");

const ISSUER: &str = "https://auth.example.com";
const REDIRECT_URI: &str = "https://app.example.com/callback";

struct TestApp {
    router: Router,
    store: Arc<MemoryCredentialStore>,
    codec: Arc<TokenCodec>,
}

struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        Self::with_default_scopes(None)
    }

    /// Applications registered through `/clients` are permitted `scopes`.
    fn with_default_scopes(scopes: Option<&str>) -> Self {
        let config = Config {
            version: "test".to_string(),
            http_port: "8080".to_string().try_into().unwrap(),
            external_base: ISSUER.to_string().try_into().unwrap(),
            openid_issuer: ISSUER.to_string(),
            jwt_keys: Default::default(),
            storage_backend: "memory".to_string(),
            database_url: None,
            database_pool_size: "".to_string().try_into().unwrap(),
            cors_allowed_origins: None.try_into().unwrap(),
            default_permitted_scopes: scopes.map(str::to_string).into(),
        };
        let store = Arc::new(MemoryCredentialStore::new().with_hash_cost(4));
        let codec = Arc::new(TokenCodec::from_pem(PRIVATE_KEY, PUBLIC_KEY, ISSUER).unwrap());
        let router = build_router(AppState::new(
            Arc::new(config),
            store.clone(),
            codec.clone(),
        ));

        Self {
            router,
            store,
            codec,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Response {
            status,
            headers,
            body,
        }
    }

    async fn create_account(&self, email: &str, password: &str) -> Response {
        self.send(
            Request::post("/accounts")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "email": email, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
    }

    /// Returns `(client_id, client_secret)`
    async fn create_client(&self, name: &str, scopes: &[&str]) -> (String, String) {
        let response = self
            .send(
                form_request("/clients")
                    .body(body(&[("name", name)]))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);

        let client_id = response.body["client_id"].as_str().unwrap().to_string();
        let client_secret = response.body["client_secret"].as_str().unwrap().to_string();

        let application = self
            .store
            .find_application_by_client_id(&client_id)
            .await
            .unwrap()
            .unwrap();
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        self.store
            .permit_scopes(application.id, &scopes)
            .await
            .unwrap();

        (client_id, client_secret)
    }

    async fn token(&self, client: &(String, String), params: &[(&str, &str)]) -> Response {
        self.send(
            form_request("/token")
                .header(header::AUTHORIZATION, basic(&client.0, &client.1))
                .body(body(params))
                .unwrap(),
        )
        .await
    }

    async fn password_grant(&self, client: &(String, String), scope: &str) -> Response {
        self.token(
            client,
            &[
                ("grant_type", "password"),
                ("username", "u@x.com"),
                ("password", "hunter2"),
                ("scope", scope),
            ],
        )
        .await
    }
}

fn form_request(uri: &str) -> http::request::Builder {
    Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
}

fn body(params: &[(&str, &str)]) -> Body {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    Body::from(encoded)
}

fn basic(id: &str, secret: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{}:{}", id, secret)))
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

#[tokio::test]
async fn test_password_grant_end_to_end() {
    let app = TestApp::new();

    let account = app.create_account("u@x.com", "hunter2").await;
    assert_eq!(account.status, StatusCode::OK);
    assert_eq!(account.body["email"], "u@x.com");

    let client = app.create_client("demo", &["read"]).await;

    let response = app.password_grant(&client, "read").await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["token_type"], "bearer");
    assert_eq!(response.body["expires_in"], 3600);
    assert!(response.body["refresh_token"].is_string());
    assert_eq!(response.headers[header::CACHE_CONTROL], "no-store");

    let access_token = response.body["access_token"].as_str().unwrap();
    let claims = app.codec.verify(access_token).unwrap();
    assert_eq!(claims.sub, "u@x.com");
    assert_eq!(claims.aud, client.0);
    assert_eq!(claims.iss, ISSUER);

    let userinfo = app
        .send(
            Request::get("/userinfo")
                .header(header::AUTHORIZATION, bearer(access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(userinfo.status, StatusCode::OK);
    assert_eq!(userinfo.body["email"], "u@x.com");
    assert_eq!(userinfo.body["sub"], "u@x.com");
    assert_eq!(userinfo.body["id"], account.body["id"]);

    let logout = app
        .send(
            Request::post("/logout")
                .header(header::AUTHORIZATION, basic("u@x.com", "hunter2"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(logout.status, StatusCode::OK);
    assert_eq!(logout.body["email"], "u@x.com");
}

#[tokio::test]
async fn test_client_endpoint_and_inline_credentials() {
    let app = TestApp::new();
    let client = app.create_client("demo", &["read"]).await;

    let response = app
        .send(
            Request::get("/client")
                .header(header::AUTHORIZATION, basic(&client.0, &client.1))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["client_id"], client.0.as_str());
    assert_eq!(response.body["name"], "demo");
    assert!(response.body.get("client_secret").is_none());

    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", client.0.as_str()),
        ("client_secret", client.1.as_str()),
        ("scope", "read"),
    ];
    let response = app
        .send(form_request("/token").body(body(&params)).unwrap())
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["scope"], "read");
    assert!(response.body.get("refresh_token").is_none());
    assert_eq!(
        app.codec
            .verify(response.body["access_token"].as_str().unwrap())
            .unwrap()
            .sub,
        client.0
    );
}

#[tokio::test]
async fn test_client_registration_fields() {
    let app = TestApp::new();

    let response = app
        .send(
            form_request("/clients")
                .body(body(&[
                    ("name", "demo"),
                    ("logo", "https://app.example.com/logo.png"),
                    ("client_type", "public"),
                ]))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["logo"], "https://app.example.com/logo.png");
    assert_eq!(response.body["client_type"], "public");

    let response = app
        .send(form_request("/clients").body(body(&[("name", "plain")])).unwrap())
        .await;
    assert_eq!(response.body["client_type"], "secret");
    assert!(response.body.get("logo").is_none());

    let response = app
        .send(
            form_request("/clients")
                .body(body(&[("name", "demo"), ("client_type", "confidential")]))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_request");
}

#[tokio::test]
async fn test_registered_clients_get_default_scopes() {
    let app = TestApp::with_default_scopes(Some("read"));
    app.create_account("u@x.com", "hunter2").await;
    let client = app.create_client("demo", &[]).await;

    let response = app
        .token(&client, &[("grant_type", "client_credentials"), ("scope", "read")])
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["scope"], "read");

    let response = app
        .token(&client, &[("grant_type", "client_credentials"), ("scope", "write")])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["error_description"],
        "requested scope exceeds permitted scope"
    );

    // Only the permitted part of the request is granted and reported.
    let issued = app.password_grant(&client, "read write").await;
    assert_eq!(issued.status, StatusCode::OK, "{}", issued.body);
    assert_eq!(issued.body["scope"], "read");

    let refreshed = app
        .token(
            &client,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", issued.body["refresh_token"].as_str().unwrap()),
                ("scope", "read"),
            ],
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK, "{}", refreshed.body);
    assert_eq!(refreshed.body["scope"], "read");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let app = TestApp::new();
    let client = app.create_client("demo", &[]).await;

    let response = app.token(&client, &[("grant_type", "bogus")]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body,
        json!({
            "error": "unsupported_grant_type",
            "error_description": "unsupported grant type \"bogus\"",
        })
    );
}

#[tokio::test]
async fn test_multiple_authorization_headers() {
    let app = TestApp::new();
    let client = app.create_client("demo", &[]).await;
    let params = [("grant_type", "client_credentials")];

    let response = app
        .send(
            form_request("/token")
                .header(header::AUTHORIZATION, basic(&client.0, &client.1))
                .header(header::AUTHORIZATION, basic(&client.0, &client.1))
                .body(body(&params))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_request");
    assert_eq!(
        response.body["error_description"],
        "multiple authorization headers"
    );
}

#[tokio::test]
async fn test_wrong_client_secret() {
    let app = TestApp::new();
    let client = app.create_client("demo", &[]).await;

    let response = app
        .token(
            &(client.0.clone(), "wrong".to_string()),
            &[("grant_type", "client_credentials")],
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.body,
        json!({ "error": "access_denied", "error_description": "invalid credentials" })
    );
}

#[tokio::test]
async fn test_missing_credentials_are_rejected_consistently() {
    let app = TestApp::new();

    for _ in 0..2 {
        let response = app
            .send(Request::get("/userinfo").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["error"], "access_denied");
        assert_eq!(response.body["error_description"], "authentication required");
    }
}

#[tokio::test]
async fn test_token_signed_by_another_key_is_rejected() {
    let app = TestApp::new();
    app.create_account("u@x.com", "hunter2").await;

    let foreign = TokenCodec::from_pem(OTHER_PRIVATE_KEY, OTHER_PUBLIC_KEY, ISSUER).unwrap();
    let token = foreign.sign("client", "u@x.com", 3600).unwrap();

    let response = app
        .send(
            Request::get("/userinfo")
                .header(header::AUTHORIZATION, bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error_description"], "invalid credentials");
}

#[tokio::test]
async fn test_refresh_token_flow() {
    let app = TestApp::new();
    app.create_account("u@x.com", "hunter2").await;
    let client = app.create_client("demo", &["read", "write"]).await;
    let other = app.create_client("other", &["read", "write"]).await;

    let issued = app.password_grant(&client, "read").await;
    let refresh_token = issued.body["refresh_token"].as_str().unwrap().to_string();

    let refreshed = app
        .token(
            &client,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ],
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK, "{}", refreshed.body);
    assert_eq!(refreshed.body["refresh_token"], refresh_token.as_str());
    assert_eq!(refreshed.body["scope"], "read");

    let escalated = app
        .token(
            &client,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("scope", "read write"),
            ],
        )
        .await;
    assert_eq!(escalated.status, StatusCode::BAD_REQUEST);
    assert_eq!(escalated.body["error"], "invalid_request");

    let cross_client = app
        .token(
            &other,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ],
        )
        .await;
    assert_eq!(cross_client.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        cross_client.body,
        json!({
            "error": "invalid_grant",
            "error_description": "refresh token is invalid or expired",
        })
    );
}

#[tokio::test]
async fn test_account_validation() {
    let app = TestApp::new();

    let response = app.create_account("", "").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_request");
    assert_eq!(response.body["error_description"], "validation failed");
    assert_eq!(response.body["fields"]["email"][0], "must provide a email");
    assert_eq!(
        response.body["fields"]["password"][0],
        "must provide a password"
    );

    let invalid = app.create_account("demo-client", "hunter2").await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.body["fields"]["email"][0], "must provide a valid email");

    assert_eq!(
        app.create_account("u@x.com", "hunter2").await.status,
        StatusCode::OK
    );
    let duplicate = app.create_account("u@x.com", "other").await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        duplicate.body["fields"],
        json!({ "email": ["email address taken"] })
    );

    let malformed = app
        .send(
            Request::post("/accounts")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(malformed.body["error"], "invalid_request");
}

async fn authorize(app: &TestApp, client_id: &str, scope: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", REDIRECT_URI)
        .append_pair("scope", scope)
        .append_pair("state", "xyz")
        .finish();

    let response = app
        .send(
            Request::get(format!("/authorize?{}", query))
                .header(header::AUTHORIZATION, basic("u@x.com", "hunter2"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER, "{}", response.body);

    let location = Url::parse(response.headers[header::LOCATION].to_str().unwrap()).unwrap();
    assert!(location.as_str().starts_with(REDIRECT_URI));
    let pairs: std::collections::HashMap<_, _> = location.query_pairs().into_owned().collect();
    assert_eq!(pairs["state"], "xyz");
    pairs["code"].clone()
}

#[tokio::test]
async fn test_authorization_code_flow() {
    let app = TestApp::new();
    app.create_account("u@x.com", "hunter2").await;
    let client = app.create_client("demo", &["read"]).await;

    let code = authorize(&app, &client.0, "read").await;
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", REDIRECT_URI),
    ];

    let response = app.token(&client, &params).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert!(response.body["refresh_token"].is_string());
    assert_eq!(response.body["scope"], "read");

    let replay = app.token(&client, &params).await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        replay.body["error_description"],
        "authorization code is invalid or expired"
    );
}

#[tokio::test]
async fn test_authorization_code_redeemed_once_under_concurrency() {
    let app = TestApp::new();
    app.create_account("u@x.com", "hunter2").await;
    let client = app.create_client("demo", &[]).await;

    let code = authorize(&app, &client.0, "").await;
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", REDIRECT_URI),
    ];

    let responses =
        futures::future::join_all((0..4).map(|_| app.token(&client, &params))).await;
    let successes = responses
        .iter()
        .filter(|response| response.status == StatusCode::OK)
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_authorize_without_response_type_returns_user() {
    let app = TestApp::new();
    app.create_account("u@x.com", "hunter2").await;

    let response = app
        .send(
            Request::post("/authorize")
                .header(header::AUTHORIZATION, basic("u@x.com", "hunter2"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["email"], "u@x.com");
}
