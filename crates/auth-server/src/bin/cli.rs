use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use cookie::Cookie;
use reqwest::{header, redirect, Client, Response, StatusCode};
use shared_types::{LoginRequest, MessageResponse, SignupRequest};
use std::path::{Path, PathBuf};

/// Name of the server's session cookie.
const SESSION_COOKIE: &str = "OAuth";

#[derive(Parser)]
#[command(name = "auth-cli")]
#[command(about = "CLI for exercising the auth server's signup, login and logout routes")]
#[command(
    long_about = "A command-line client for the auth server.\n\n\
    Login stores the session cookie in a local file so later commands\n\
    (status, logout) run as the logged-in user."
)]
struct Cli {
    /// Auth server URL to connect to.
    #[arg(
        short,
        long,
        default_value = "http://localhost:8080",
        env = "AUTH_SERVER_URL"
    )]
    base_url: String,

    /// File holding the session cookie between invocations.
    #[arg(long, default_value = ".auth-cli-session", env = "AUTH_CLI_SESSION_FILE")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a local account
    ///
    /// Does not log in; run 'login' afterwards.
    Signup {
        username: String,

        password: String,

        /// Optional name shown instead of the username.
        #[arg(short, long, value_name = "TEXT")]
        display_name: Option<String>,
    },

    /// Log in with a username and password and save the session cookie
    Login { username: String, password: String },

    /// Clear the session on the server and delete the saved cookie
    Logout,

    /// Call the authenticated health check ('GET /') with the saved session
    Status,

    /// Call the unauthenticated liveness check ('GET /health')
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Redirects carry the answer (and the Set-Cookie), so never follow them.
    let client = Client::builder()
        .redirect(redirect::Policy::none())
        .build()?;
    let base_url = cli.base_url.trim_end_matches('/');

    match cli.command {
        Commands::Signup {
            username,
            password,
            display_name,
        } => {
            let request = SignupRequest {
                username,
                password,
                display_name,
            };
            if let Err(reason) = request.validate() {
                bail!("Invalid signup: {}", reason);
            }

            let response = client
                .post(format!("{}/signup", base_url))
                .json(&request)
                .send()
                .await?;
            match response.status() {
                StatusCode::FOUND => println!(
                    "Signed up {}. Next: {}",
                    request.username,
                    location(&response)
                ),
                _ => report_failure(response).await?,
            }
        }
        Commands::Login { username, password } => {
            let response = client
                .post(format!("{}/login", base_url))
                .json(&LoginRequest {
                    username: username.clone(),
                    password,
                })
                .send()
                .await?;

            match response.status() {
                StatusCode::FOUND => match session_cookie(&response) {
                    Some(pair) => {
                        save_session(&cli.session_file, &pair)?;
                        println!("Logged in as {}", username);
                    }
                    None => println!("Already logged in (redirected to {})", location(&response)),
                },
                StatusCode::UNAUTHORIZED => {
                    let body: MessageResponse = response.json().await?;
                    println!("Login rejected: {}", body.message);
                }
                _ => report_failure(response).await?,
            }
        }
        Commands::Logout => {
            let mut request = client.post(format!("{}/logout", base_url));
            if let Some(pair) = load_session(&cli.session_file)? {
                request = request.header(header::COOKIE, pair);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return report_failure(response).await;
            }
            let body: MessageResponse = response.json().await?;
            remove_session(&cli.session_file)?;
            println!("{}", body.message);
        }
        Commands::Status => {
            let mut request = client.get(format!("{}/", base_url));
            if let Some(pair) = load_session(&cli.session_file)? {
                request = request.header(header::COOKIE, pair);
            }

            let response = request.send().await?;
            if let Some(pair) = session_cookie(&response) {
                save_session(&cli.session_file, &pair)?;
            }
            match response.status() {
                StatusCode::OK => println!("{}", response.text().await?),
                StatusCode::UNAUTHORIZED => println!("Not logged in."),
                _ => report_failure(response).await?,
            }
        }
        Commands::Health => {
            let status = client
                .get(format!("{}/health", base_url))
                .send()
                .await?
                .status();
            println!("{}", status);
        }
    }

    Ok(())
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// `OAuth=<token>` from the response's `Set-Cookie` headers, if it sets one.
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v).ok())
        .find(|c| c.name() == SESSION_COOKIE && !c.value().is_empty())
        .map(|c| format!("{}={}", c.name(), c.value()))
}

async fn report_failure(response: Response) -> anyhow::Result<()> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    bail!("Request failed: {} {}", status, body)
}

fn load_session(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let pair = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Some(pair.trim().to_string()).filter(|p| !p.is_empty()))
}

fn save_session(path: &Path, pair: &str) -> anyhow::Result<()> {
    std::fs::write(path, pair).with_context(|| format!("Failed to write {}", path.display()))
}

fn remove_session(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
