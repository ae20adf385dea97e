use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use traeky::app::Traeky;
use traeky::cli::{
    handle_config_command, handle_db_command, handle_export_command, handle_profile_command,
    handle_tx_command, DbCommands, ExportArgs, PinSource, ProfileCommands, TxCommands,
};
use traeky::config::{Settings, TraekyPaths};

#[derive(Parser)]
#[command(
    name = "traeky",
    version,
    about = "Local-first portfolio tracker with encrypted profiles",
    long_about = "Traeky keeps each profile's transactions encrypted under its own PIN \
                  and mirrors the whole database into a portable file that can be \
                  moved between devices and merged back."
)]
struct Cli {
    /// PIN of the profile being used
    #[arg(long, global = true, env = "TRAEKY_PIN", hide_env_values = true)]
    pin: Option<String>,

    /// PIN to set when creating a profile or changing a PIN
    #[arg(long, global = true, env = "TRAEKY_NEW_PIN", hide_env_values = true)]
    new_pin: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile management commands
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Transaction management commands
    #[command(subcommand, alias = "txn")]
    Tx(TxCommands),

    /// Database file and sync commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Export a profile's transactions as CSV
    Export(ExportArgs),

    /// Show current configuration and paths
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TRAEKY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let Some(command) = cli.command else {
        println!("Traeky - local-first portfolio tracker");
        println!();
        println!("Run 'traeky --help' for usage information.");
        println!("Run 'traeky profile create <NAME>' to get started.");
        return Ok(());
    };

    let paths = TraekyPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;
    let legacy = settings.legacy_config().with_env_overrides();
    let pins = PinSource::new(cli.pin, cli.new_pin);

    let app = Traeky::open(paths, settings, legacy, None).await?;

    let result = match command {
        Commands::Profile(cmd) => handle_profile_command(&app, &pins, cmd).await,
        Commands::Tx(cmd) => handle_tx_command(&app, &pins, cmd).await,
        Commands::Db(cmd) => handle_db_command(&app, cmd).await,
        Commands::Export(args) => handle_export_command(&app, &pins, args).await,
        Commands::Config => handle_config_command(&app),
    };

    app.shutdown().await;
    Ok(result?)
}
