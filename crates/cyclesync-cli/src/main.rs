//! CycleSync CLI - cycle tracking together
//!
//! Plays the presentation shell for the session core: it renders one of the
//! loading, sign-in or main views and turns commands into user intents.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use cyclesync_core::Error;
use cyclesync_core::config::Config;
use cyclesync_core::domain::flags::{DEMO_FLAG_KEY, FlagStore, is_demo_flag_set};
use cyclesync_core::domain::identity::{
    FederatedAuthorizer, FederatedCredential, ProviderError, ProviderResult,
};
use cyclesync_core::domain::session::{AuthError, Session, SessionManager, View};
use cyclesync_core::infrastructure::flags::FileFlagStore;
use cyclesync_core::infrastructure::identity::RestIdentityProvider;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cyclesync")]
#[command(author, version, about = "Cycle tracking together", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current session
    Status,

    /// Sign in with email and password
    SignIn {
        /// Account email (prompted if omitted)
        #[arg(short, long)]
        email: Option<String>,
        /// Account password (prompted if omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create an account and sign in
    SignUp {
        /// Account email (prompted if omitted)
        #[arg(short, long)]
        email: Option<String>,
        /// Account password (prompted if omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign in with a Google account
    SignInGoogle {
        /// Google ID token (prompted if omitted)
        #[arg(long)]
        id_token: Option<String>,
    },

    /// Explore the app with a demo account, no sign-in needed
    Demo,

    /// Sign out and leave demo mode
    SignOut,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

/// Federated authorizer that takes a Google ID token from the command line
/// or asks for one
struct PromptAuthorizer {
    id_token: Option<String>,
}

#[async_trait]
impl FederatedAuthorizer for PromptAuthorizer {
    async fn authorize(&self) -> ProviderResult<FederatedCredential> {
        let token = match &self.id_token {
            Some(token) => token.clone(),
            None => tokio::task::spawn_blocking(|| prompt("Google ID token: "))
                .await
                .map_err(|e| ProviderError::Unavailable(e.to_string()))?
                .map_err(|e| ProviderError::Unavailable(e.to_string()))?,
        };

        let token = token.trim();
        if token.is_empty() {
            return Err(ProviderError::Unavailable(
                "no Google ID token provided".to_string(),
            ));
        }
        Ok(FederatedCredential::google(token))
    }
}

fn prompt(label: &str) -> anyhow::Result<String> {
    let mut editor = DefaultEditor::new()?;
    match editor.readline(label) {
        Ok(line) => Ok(line.trim().to_string()),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
            Err(anyhow::anyhow!("Input cancelled"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn prompt_credentials(
    email: Option<String>,
    password: Option<String>,
) -> anyhow::Result<(String, String)> {
    let email = match email {
        Some(email) => email,
        None => tokio::task::spawn_blocking(|| prompt("Email: ")).await??,
    };
    let password = match password {
        Some(password) => password,
        None => tokio::task::spawn_blocking(|| prompt("Password: ")).await??,
    };
    Ok((email, password))
}

/// Wire the session manager to the REST provider and the flag file
fn build_manager(config: &Config, id_token: Option<String>) -> anyhow::Result<SessionManager> {
    let settings = config.identity.resolve()?;
    let provider = RestIdentityProvider::builder(settings)
        .credentials_path(Config::credentials_path()?)
        .authorizer(Arc::new(PromptAuthorizer { id_token }))
        .build()?;
    let flags = FileFlagStore::new(Config::flags_path()?);

    Ok(SessionManager::new(Arc::new(provider), Arc::new(flags)))
}

/// Initialize and wait for the session to leave `Loading`
async fn settle(manager: &SessionManager, config: &Config, quiet: bool) -> anyhow::Result<Session> {
    manager.initialize().await;
    wait_settled(manager, config, quiet).await
}

async fn wait_settled(manager: &SessionManager, config: &Config, quiet: bool) -> anyhow::Result<Session> {
    let timeout = Duration::from_secs(config.session.settle_timeout_secs);
    manager
        .settled(timeout)
        .await
        .map_err(|e| failure(e, quiet))
}

fn render(session: &Session, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let view = View::for_session(session);

    if let OutputFormat::Json = format {
        let output = serde_json::json!({
            "session": session,
            "view": view,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Session: {}", session.mode());
    println!("View: {}", view.as_str());
    if let Some(identity) = session.identity() {
        println!("User: {}", identity);
    }
    if let Some(err) = session.error() {
        println!("Error: [{}] {}", err.code(), err);
    }

    if !quiet {
        match view {
            View::Loading => println!("Still determining the session. Try again shortly."),
            View::SignIn { offer_demo: true } => {
                println!();
                println!("Sign-in is unavailable right now. Explore with a demo account:");
                println!("  cyclesync demo");
            }
            View::SignIn { offer_demo: false } => {
                println!();
                println!("Sign in with `cyclesync sign-in` or try `cyclesync demo`.");
            }
            View::Main => {}
        }
    }
    Ok(())
}

fn failure(err: Error, quiet: bool) -> anyhow::Error {
    if !quiet && let Some(suggestion) = err.suggestion() {
        eprintln!("Hint: {}", suggestion);
    }
    anyhow::anyhow!("[{}] {}", err.code(), err)
}

fn auth_failure(err: AuthError, quiet: bool) -> anyhow::Error {
    failure(Error::Auth(err), quiet)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cyclesync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => cmd_config(action, cli.quiet),
        Commands::Doctor => cmd_doctor(cli.quiet).await,
        command => {
            let config = Config::load()?;
            let id_token = match &command {
                Commands::SignInGoogle { id_token } => id_token.clone(),
                _ => None,
            };
            let manager = build_manager(&config, id_token)?;
            let result = cmd_session(&manager, &config, command, cli.format, cli.quiet).await;
            manager.shutdown();
            result
        }
    }
}

async fn cmd_session(
    manager: &SessionManager,
    config: &Config,
    command: Commands,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let session = settle(manager, config, quiet).await?;

    let session = match command {
        Commands::Status => session,

        Commands::SignIn { email, password } => {
            let (email, password) = prompt_credentials(email, password).await?;
            manager
                .sign_in_with_credentials(&email, &password)
                .await
                .map_err(|e| auth_failure(e, quiet))?
        }

        Commands::SignUp { email, password } => {
            let (email, password) = prompt_credentials(email, password).await?;
            manager
                .sign_up_with_credentials(&email, &password)
                .await
                .map_err(|e| auth_failure(e, quiet))?
        }

        Commands::SignInGoogle { .. } => manager
            .sign_in_with_federated_provider()
            .await
            .map_err(|e| auth_failure(e, quiet))?,

        Commands::Demo => {
            manager.enter_demo_mode().await;
            manager.session()
        }

        Commands::SignOut => {
            manager.sign_out().await;
            wait_settled(manager, config, quiet).await?
        }

        Commands::Config { .. } | Commands::Doctor => {
            return Err(anyhow::anyhow!("not a session command"));
        }
    };

    info!(mode = %session.mode(), "Session ready");
    render(&session, format, quiet)
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("CycleSync Health Check");
        println!("======================");
        println!();
    }

    let mut all_ok = true;

    // Check configuration
    match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }

            match config.identity.resolve() {
                Ok(settings) if settings.is_configured() => {
                    if !quiet {
                        let redacted = config.identity.redacted_api_key()?.unwrap_or_default();
                        println!("[OK] Identity provider: Configured ({})", redacted);
                        println!("     Endpoint: {}", settings.endpoint);
                    }
                }
                Ok(settings) => {
                    if !quiet {
                        warn!(missing = ?settings.missing(), "Identity provider not configured");
                        println!("[--] Identity provider: not configured (demo mode only)");
                        println!("     Missing: {}", settings.missing().join(", "));
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Identity provider: Error - {}", e);
                    }
                }
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
        }
    }

    // Check config file location
    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => {
                println!("[!!] Config file: Error - {}", e);
            }
        }
    }

    // Check durable flags
    if !quiet {
        match Config::flags_path() {
            Ok(path) => {
                let store = FileFlagStore::new(&path);
                match store.get(DEMO_FLAG_KEY).await {
                    Ok(value) if is_demo_flag_set(value.as_deref()) => {
                        println!("[OK] Demo mode: enabled ({})", path.display());
                    }
                    Ok(_) => println!("[OK] Demo mode: off"),
                    Err(e) => {
                        all_ok = false;
                        println!("[!!] Demo mode flag: {}", e);
                    }
                }
            }
            Err(e) => {
                all_ok = false;
                println!("[!!] Flag store: Error - {}", e);
            }
        }
    }

    // Summary
    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}
