//! Registrar command line client
//!
//! Talks to a running registrar server over HTTP.
//!
//! ```bash
//! registrar-client --base-url http://localhost:8080 create-account \
//!   --email user@example.com --password hunter2
//!
//! registrar-client create-client --name "My App"
//!
//! registrar-client token --client-id <id> --client-secret <secret> \
//!   --username user@example.com --password hunter2 --scope "read"
//!
//! registrar-client userinfo --access-token <token>
//! ```
//!
//! The base URL may also be set with `REGISTRAR_BASE_URL`.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Network or response decoding error
//! - 2: The server rejected the request

use clap::{Args, Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::process;

/// Main CLI application structure
#[derive(Parser)]
#[command(
    name = "registrar-client",
    about = "Command line client for the registrar authorization server",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Base URL of the registrar server
    #[arg(long, env = "REGISTRAR_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user account
    CreateAccount(CreateAccountArgs),
    /// Register a client application
    CreateClient(CreateClientArgs),
    /// Request an access token with the password grant
    Token(TokenArgs),
    /// Show the user an access token belongs to
    Userinfo(UserinfoArgs),
}

#[derive(Args)]
struct CreateAccountArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Args)]
struct CreateClientArgs {
    /// Human-readable application name
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    website: Option<String>,
    /// Logo URL
    #[arg(long)]
    logo: Option<String>,
    /// `secret` or `public`
    #[arg(long)]
    client_type: Option<String>,
}

#[derive(Args)]
struct TokenArgs {
    #[arg(long, env = "REGISTRAR_CLIENT_ID")]
    client_id: String,
    #[arg(long, env = "REGISTRAR_CLIENT_SECRET")]
    client_secret: String,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    /// Space-separated scopes
    #[arg(long)]
    scope: Option<String>,
}

#[derive(Args)]
struct UserinfoArgs {
    #[arg(long, env = "REGISTRAR_ACCESS_TOKEN")]
    access_token: String,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request failed with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = Client::new();

    let request = match &cli.command {
        Commands::CreateAccount(args) => client
            .post(format!("{}/accounts", cli.base_url))
            .json(&json!({ "email": args.email, "password": args.password })),
        Commands::CreateClient(args) => {
            let mut form = vec![("name", args.name.as_str())];
            if let Some(description) = &args.description {
                form.push(("description", description));
            }
            if let Some(website) = &args.website {
                form.push(("website", website));
            }
            if let Some(logo) = &args.logo {
                form.push(("logo", logo));
            }
            if let Some(client_type) = &args.client_type {
                form.push(("client_type", client_type));
            }
            client
                .post(format!("{}/clients", cli.base_url))
                .form(&form)
        }
        Commands::Token(args) => {
            let mut form = vec![
                ("grant_type", "password"),
                ("username", args.username.as_str()),
                ("password", args.password.as_str()),
            ];
            if let Some(scope) = &args.scope {
                form.push(("scope", scope));
            }
            client
                .post(format!("{}/token", cli.base_url))
                .basic_auth(&args.client_id, Some(&args.client_secret))
                .form(&form)
        }
        Commands::Userinfo(args) => client
            .get(format!("{}/userinfo", cli.base_url))
            .bearer_auth(&args.access_token),
    };

    match send(&cli, request).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(output) => println!("{}", output),
            Err(err) => {
                eprintln!("Error: {}", err);
                process::exit(1);
            }
        },
        Err(err @ AppError::Rejected { .. }) => {
            eprintln!("Error: {}", err);
            process::exit(2);
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}

async fn send(cli: &Cli, request: RequestBuilder) -> Result<Value, AppError> {
    let response = request.send().await?;
    let status = response.status();

    if cli.verbose {
        eprintln!("Response status: {}", status);
    }

    let body = response.text().await?;
    if !status.is_success() {
        return Err(AppError::Rejected { status, body });
    }

    Ok(serde_json::from_str(&body)?)
}
