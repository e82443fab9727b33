//! KindEarth storefront client - sign in, register and inspect the local session.

mod app;

use std::path::PathBuf;
use std::process::ExitCode;

use app::{App, RegisterArgs};
use clap::{Parser, Subcommand};
use kindearth_config::{init_logging, Config, Paths};

/// KindEarth storefront command-line interface.
#[derive(Parser)]
#[command(name = "kindearth")]
#[command(about = "KindEarth storefront client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, session, logs). Defaults to ~/.kindearth
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Backend API URL, overriding config and environment
    #[arg(long, global = true, env = "KINDEARTH_API_URL")]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        /// Keep the session across restarts
        #[arg(short, long)]
        remember: bool,
    },
    /// Create a customer or vendor account
    Register(RegisterArgs),
    /// Sign out locally and on the backend
    Logout,
    /// Show the restored session, if any
    Whoami,
    /// Fetch the CSRF token and show its state
    Csrf,
}

impl Commands {
    /// `whoami` only reads local state.
    fn uses_backend(&self) -> bool {
        !matches!(self, Commands::Whoami)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let mut config = Config::load(&paths)?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, Some(&paths.log_file()));

    let app = App::new(&paths, &config)?;
    app.start(cli.command.uses_backend()).await?;

    let outcome = match cli.command {
        Commands::Login {
            email,
            password,
            remember,
        } => app.login(&email, &password, remember).await?,
        Commands::Register(args) => app.register(args).await?,
        Commands::Logout => app.logout().await?,
        Commands::Whoami => app.whoami()?,
        Commands::Csrf => app.csrf()?,
    };

    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    if let Some(message) = &outcome.message {
        eprintln!("{}", message);
    }

    Ok(if outcome.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
