//! TruckTech+ scraper CLI
//!
//! # Commands
//!
//! - `sync` - Sign in and export every vehicle with its fault codes
//! - `test-login` - Sign in only, refreshing the stored session
//! - `status` - Show the stored session and whether credentials are set
//! - `init` - Write a default config file and optionally store credentials

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Export vehicle and fault data from the TruckTech+ portal.
#[derive(Parser)]
#[command(name = "trucktech")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Login overrides shared by the commands that sign in.
#[derive(clap::Args, Debug, Default)]
pub struct LoginArgs {
    /// Portal username (defaults to TRUCKTECH_USERNAME or the credentials file)
    #[arg(long, requires = "password")]
    pub username: Option<String>,

    /// Portal password
    #[arg(long, requires = "username")]
    pub password: Option<String>,

    /// One-time MFA code to submit if the portal asks for one
    #[arg(long)]
    pub mfa_code: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and export all vehicles and fault codes
    Sync {
        /// Tenant the export is recorded under
        #[arg(short, long, default_value = "default")]
        tenant: String,

        /// Write the summary JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        login: LoginArgs,
    },

    /// Sign in and store the session, without exporting
    TestLogin {
        #[command(flatten)]
        login: LoginArgs,
    },

    /// Show the stored session and credential configuration
    Status,

    /// Write a default config file and optionally store credentials
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,

        /// Username to store in the credentials file
        #[arg(long, requires = "password")]
        username: Option<String>,

        /// Password to store in the credentials file
        #[arg(long, requires = "username")]
        password: Option<String>,

        /// Base32 TOTP secret to store with the credentials
        #[arg(long, requires = "username")]
        totp_secret: Option<String>,
    },
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,trucktech=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    tracing::debug!("trucktech v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.as_deref();
    let load_config = || commands::load_config(config_path);

    let ok = match cli.command {
        Commands::Sync {
            tenant,
            output,
            login,
        } => commands::sync::run(load_config()?, &tenant, output.as_deref(), &login).await?,
        Commands::TestLogin { login } => commands::login::run(load_config()?, &login).await?,
        Commands::Status => commands::status::run(&load_config()?).await?,
        Commands::Init {
            force,
            username,
            password,
            totp_secret,
        } => {
            let new = commands::init::NewCredentials {
                username,
                password,
                totp_secret,
            };
            commands::init::run(
                &commands::init::config_path(config_path)?,
                commands::init::credentials_path(),
                force,
                new,
            )?
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
