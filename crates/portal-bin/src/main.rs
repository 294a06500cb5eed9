//! Portal - command-line host for the Mortise session core.
//!
//! The deployment flavor comes from the config file or `PORTAL_FLAVOR`.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use portal_config_and_utils::{init_logging, Config, Paths};

/// Portal command-line interface.
#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Sign in to a Mortise backend and call its API with the stored session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (cookies, local storage, logs, config). Defaults to ~/.portal
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Backend base URL, overriding configuration
    #[arg(long, global = true)]
    api_base: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with account and password
    Login {
        account: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Clear the stored session
    Logout,
    /// Renew the session now
    Refresh,
    /// Show the session state
    Status,
    /// Open the authorization page of an OAuth provider
    OauthLogin { provider: String },
    /// Finish an OAuth login with the state from the provider callback
    OauthCallback { state: String },
    /// Reload the signed-in user from the backend
    Me,
    /// Show the navigation menu tree
    Menus,
    /// Show the profile
    Profile,
    /// List one page of an admin collection
    List {
        /// Collection path, e.g. /api/v1/admin/users
        path: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
        #[arg(long)]
        keyword: Option<String>,
    },
    /// GET any API path with the session attached
    Get { path: String },
    /// Keep the session renewed until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_logging(&config.log_level);

    let context = commands::start(config, &paths)?;
    let outcome = match cli.command {
        Commands::Login { account, password } => {
            commands::login(&context, &account, &password).await
        }
        Commands::Logout => commands::logout(&context),
        Commands::Refresh => commands::refresh(&context).await,
        Commands::Status => commands::status(&context),
        Commands::OauthLogin { provider } => commands::oauth_login(&context, &provider).await,
        Commands::OauthCallback { state } => commands::oauth_callback(&context, &state).await,
        Commands::Me => commands::me(&context).await,
        Commands::Menus => commands::menus(&context).await,
        Commands::Profile => commands::profile(&context).await,
        Commands::List {
            path,
            page,
            size,
            keyword,
        } => commands::list(&context, &path, page, size, keyword).await,
        Commands::Get { path } => commands::get(&context, &path).await,
        Commands::Watch => commands::watch(&context).await,
    };
    context.shutdown().await;

    outcome
}
