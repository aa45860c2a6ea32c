//! Developer CLI for Porchkit.
//!
//! Exercises the auth flows end to end against a hosted environment or a
//! self-hosted backend: sign-up, sign-in, session inspection, profile
//! updates, sign-out. Sessions persist between invocations in a file
//! under the user config directory, so `sign-in` followed by `whoami`
//! behaves like an app restart.

mod store;

use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::eyre;
use porchkit_core::identity::{HttpIdentityClient, IdentityClient};
use porchkit_core::{Environment, IdentityConfig, ProfileUpdate, User};

use crate::store::FileSecureStore;

#[derive(Debug, Parser)]
#[command(name = "porchkit", version, about = "Porchkit auth developer tool")]
struct Cli {
    /// Hosted environment to target (staging or production).
    #[arg(long, default_value = "staging", env = "PORCHKIT_ENV", global = true)]
    env: String,

    /// Self-hosted backend base URL; overrides --env.
    #[arg(long, env = "PORCHKIT_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Publishable API key, required with --base-url.
    #[arg(long, env = "PORCHKIT_API_KEY", global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account.
    SignUp {
        /// Email address for the new account.
        email: String,
        /// Password for the new account.
        #[arg(long)]
        password: String,
    },
    /// Sign in with email and password.
    SignIn {
        /// Email address of the account.
        email: String,
        /// Password of the account.
        #[arg(long)]
        password: String,
    },
    /// Show the current session, refreshing it if expired.
    Whoami,
    /// Update profile fields on the signed-in account.
    UpdateProfile {
        /// New display name.
        #[arg(long)]
        name: Option<String>,
        /// New avatar URL.
        #[arg(long)]
        avatar_url: Option<String>,
    },
    /// Sign out and discard the local session.
    SignOut,
}

fn resolve_config(cli: &Cli) -> eyre::Result<IdentityConfig> {
    if let Some(base_url) = &cli.base_url {
        let api_key = cli
            .api_key
            .clone()
            .ok_or_else(|| eyre!("--api-key is required with --base-url"))?;
        return Ok(IdentityConfig::custom(base_url, api_key));
    }
    let environment = Environment::from_str(&cli.env).map_err(|_| {
        eyre!(
            "unknown environment {:?} (expected staging or production)",
            cli.env
        )
    })?;
    Ok(IdentityConfig::for_environment(&environment))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let store = Arc::new(FileSecureStore::default_path()?);
    let client = HttpIdentityClient::new(config, store);

    match cli.command {
        Command::SignUp { email, password } => {
            client.sign_up(&email, &password).await?;
            println!("account created for {email}; a confirmation email may be required before signing in");
        }
        Command::SignIn { email, password } => {
            client.sign_in(&email, &password).await?;
            println!("signed in as {email}");
        }
        Command::Whoami => match client.bootstrap_session().await? {
            Some(payload) => {
                let user = User::from_payload(&payload);
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
            None => println!("not signed in"),
        },
        Command::UpdateProfile { name, avatar_url } => {
            client
                .update_profile(&ProfileUpdate { name, avatar_url })
                .await?;
            println!("profile updated");
        }
        Command::SignOut => {
            client.sign_out().await?;
            println!("signed out");
        }
    }
    Ok(())
}
