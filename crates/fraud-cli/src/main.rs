//! Fraud Fishing CLI
//!
//! Signs in against the Fraud Fishing backend, keeps the credential pair in
//! the OS keychain (or an encrypted file), and issues authenticated requests
//! that refresh the access credential transparently.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};

use fraud_client::{
    open_backend, ClientSettings, FraudClient, SessionState, SettingsManager, StorageBackend,
};

/// Fraud Fishing - command-line client for the fraud reporting service
#[derive(Parser, Debug)]
#[command(name = "fraud-fishing")]
#[command(version)]
#[command(about = "Fraud Fishing - command-line client for the fraud reporting service")]
struct Args {
    /// Backend base URL (overrides the saved setting)
    #[arg(long, global = true, env = "FRAUD_FISHING_BASE_URL")]
    base_url: Option<String>,

    /// Namespace scoping the stored credentials
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Credential storage backend: keychain, file or memory
    #[arg(long, global = true)]
    storage: Option<StorageBackend>,

    /// Passphrase for the encrypted file backend
    #[arg(long, global = true, env = "FRAUD_FISHING_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Directory holding settings.json (and the credential file)
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account (does not sign in)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Sign in and store the issued credentials
    Login {
        #[arg(long)]
        email: String,
    },
    /// Remove stored credentials
    Logout,
    /// Show whether a session is stored and for whom
    Status,
    /// GET a path relative to the base URL and print the JSON body
    Get {
        path: String,
        /// Send without credentials
        #[arg(long)]
        public: bool,
    },
    /// Inspect or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    /// Set one of: base-url, namespace, storage, timeout (seconds, 0 disables)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so `get` output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings_dir = match &args.settings_dir {
        Some(dir) => dir.clone(),
        None => SettingsManager::default_dir()?,
    };
    let mut manager = SettingsManager::new(&settings_dir)
        .map_err(|e| format!("Failed to load settings: {}", e))?;

    let settings = effective_settings(manager.get(), &args);
    let command = match args.command {
        Command::Config { action } => return run_config(&mut manager, &action).await,
        command => command,
    };

    let storage = open_backend(
        settings.storage,
        &settings.namespace,
        args.settings_dir.as_ref().map(|dir| dir.join("credentials")),
        args.passphrase.as_deref(),
    )
    .await
    .map_err(|e| format!("Failed to open credential storage: {}", e))?;

    let client = FraudClient::new(&settings, storage).await?;
    debug!("Using {}", client.base_url());

    match command {
        Command::Register { name, email } => {
            let password = read_password()?;
            client.register(&name, &email, &password).await?;
            println!("Registered {} <{}>, sign in with `login`", name, email);
        }
        Command::Login { email } => {
            let password = read_password()?;
            let user = client.login(&email, &password).await?;
            println!(
                "Signed in as {} <{}>{}",
                user.name,
                user.email,
                if user.is_admin() { " (admin)" } else { "" }
            );
        }
        Command::Logout => {
            client.logout().await?;
            println!("Signed out");
        }
        Command::Status => match client.state() {
            SessionState::Anonymous => println!("Not signed in"),
            SessionState::Authenticated | SessionState::Refreshing => {
                let backend = client.session().store().backend_name();
                match client.current_user().await? {
                    Some(user) => println!(
                        "Signed in as {} <{}> (id {}{}, {} on {})",
                        user.name,
                        user.email,
                        user.id,
                        if user.is_admin() { ", admin" } else { "" },
                        settings.namespace,
                        backend
                    ),
                    None => println!("Signed in ({} on {})", settings.namespace, backend),
                }
            }
        },
        Command::Get { path, public } => {
            let body: serde_json::Value = client.get_json(&path, !public).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Config { .. } => {}
    }

    Ok(())
}

/// Password from FRAUD_FISHING_PASSWORD, else prompted without echo
fn read_password() -> std::io::Result<String> {
    match std::env::var("FRAUD_FISHING_PASSWORD") {
        Ok(password) => Ok(password),
        Err(_) => rpassword::prompt_password("Password: "),
    }
}

/// Saved settings with command-line overrides applied
fn effective_settings(saved: &ClientSettings, args: &Args) -> ClientSettings {
    let mut settings = saved.clone();
    if let Some(base_url) = &args.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(namespace) = &args.namespace {
        settings.namespace = namespace.clone();
    }
    if let Some(storage) = args.storage {
        settings.storage = storage;
    }
    settings
}

async fn run_config(
    manager: &mut SettingsManager,
    action: &ConfigAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(manager.get())?);
            println!("# {}", manager.settings_file().display());
        }
        ConfigAction::Set { key, value } => {
            let mut settings = manager.get().clone();
            match key.as_str() {
                "base-url" => settings.base_url = value.clone(),
                "namespace" => settings.namespace = value.clone(),
                "storage" => settings.storage = value.parse::<StorageBackend>()?,
                "timeout" => settings.request_timeout_secs = value.parse()?,
                other => return Err(format!("Unknown setting: {}", other).into()),
            }
            manager.update(settings).await?;
            info!("Saved settings to {}", manager.settings_file().display());
        }
    }
    Ok(())
}
