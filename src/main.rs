use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wa_bridge::common::config::{apply_overrides, config_path, load_config_from, ConfigOverrides};
use wa_bridge::common::config_commands;
use wa_bridge::server;

#[derive(Parser)]
#[command(name = "wa-bridge")]
#[command(about = "HTTP bridge for a messaging account session")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default)
    Serve(ServeArgs),

    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long, short)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the config file (or the defaults)
    Show,
    /// Write a default config file
    Init {
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(config_path);

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            init_tracing();

            let config = load_config_from(&path)?;
            let config = apply_overrides(config, &ConfigOverrides { port: args.port });
            server::run(config).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => config_commands::run_config_path(&path),
            ConfigAction::Show => config_commands::run_config_show(&path),
            ConfigAction::Init { force } => {
                config_commands::run_config_init(&path, force).map(|_| ())
            }
        },
    }
}
