use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use portal::app::{FormOutcome, Portal};
use portal::config::{AuthBackend, ConfigError, PortalConfig};
use portal::error::AuthError;
use portal::guard::GuardDecision;
use portal::session::SessionState;
use portal::transport::ApiError;
use portal::types::UserUpdate;
use portal::validate::{LoginForm, SignupForm};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Rejected(String),
    #[error("not logged in")]
    NotLoggedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "portal", about = "Session client for the application skeleton")]
struct Cli {
    /// Overrides `PORTAL_API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Overrides `PORTAL_AUTH_BACKEND` (`mock` or `http`).
    #[arg(long)]
    backend: Option<AuthBackend>,

    /// Overrides `PORTAL_STORE_PATH`.
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the persisted session state.
    Status,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    Logout,
    /// Print the current user; `--remote` asks the backend instead of the store.
    Whoami {
        #[arg(long)]
        remote: bool,
    },
    /// Evaluate the route guard for a path.
    Visit { path: String },
    User(UserCommand),
}

#[derive(Args, Debug)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand, Debug)]
enum UserSubcommand {
    Get {
        id: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env loaded");
    }

    let mut config = PortalConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.api_base_url = base_url.trim_end_matches('/').to_owned();
    }
    if let Some(backend) = cli.backend {
        config.auth_backend = backend;
    }
    if let Some(store_path) = cli.store_path {
        config.store_path = store_path;
    }

    let mut portal = Portal::from_config(config)?;
    portal.start();

    match cli.command {
        Command::Status => run_status(&portal),
        Command::Login { email, password } => {
            let outcome = portal.submit_login(&LoginForm { email, password }).await;
            report_outcome(&portal, outcome)
        }
        Command::Signup { name, email, password, confirm } => {
            let form = SignupForm { name, email, password, confirm_password: confirm };
            let outcome = portal.submit_signup(&form).await;
            report_outcome(&portal, outcome)
        }
        Command::Logout => run_logout(&mut portal).await,
        Command::Whoami { remote } => run_whoami(&portal, remote).await,
        Command::Visit { path } => {
            run_visit(&mut portal, &path);
            Ok(())
        }
        Command::User(user) => run_user(&portal, user).await,
    }
}

fn run_status(portal: &Portal) -> Result<(), CliError> {
    match portal.session().state() {
        SessionState::Authenticated(user) => println!("authenticated as {} <{}>", user.name, user.email),
        SessionState::Unauthenticated => println!("not logged in"),
        SessionState::Loading => println!("loading"),
    }
    Ok(())
}

fn report_outcome(portal: &Portal, outcome: FormOutcome) -> Result<(), CliError> {
    match outcome {
        FormOutcome::Redirect(route) => {
            if let Some(user) = portal.session().user() {
                println!("welcome, {} ({})", user.name, user.initial());
            }
            println!("-> {route}");
            Ok(())
        }
        FormOutcome::Invalid(e) => Err(CliError::Rejected(e.to_string())),
        FormOutcome::Failed(message) => Err(CliError::Rejected(message)),
    }
}

async fn run_logout(portal: &mut Portal) -> Result<(), CliError> {
    // Wait for the best-effort backend call so the process does not exit under it.
    if let Some(handle) = portal.logout() {
        if let Err(e) = handle.await {
            tracing::debug!(error = %e, "backend logout task aborted");
        }
    }
    println!("logged out");
    Ok(())
}

async fn run_whoami(portal: &Portal, remote: bool) -> Result<(), CliError> {
    let user = if remote {
        portal.auth().current_user().await?
    } else {
        portal.session().user().cloned().ok_or(CliError::NotLoggedIn)?
    };
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

fn run_visit(portal: &mut Portal, path: &str) {
    let nav = portal.navigate(path);
    match nav.decision {
        GuardDecision::Render => println!("render {} ({})", nav.route.title(), nav.route),
        GuardDecision::Placeholder => println!("loading..."),
        GuardDecision::Redirect(to) => println!("redirect {to}"),
    }
}

async fn run_user(portal: &Portal, user: UserCommand) -> Result<(), CliError> {
    match user.command {
        UserSubcommand::Get { id } => {
            let user = portal.users().get_user(&id).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        UserSubcommand::Update { id, name, email } => {
            let user = portal.users().update_user(&id, &UserUpdate { email, name }).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        UserSubcommand::Delete { id } => {
            portal.users().delete_user(&id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}
