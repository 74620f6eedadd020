use anyhow::{Context, Result};
use axum::{routing::any, Router};
use beckon::config::{get_config_path, Config};
use beckon::{ws_handler, RelayState};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "beckon")]
#[command(about = "Signaling relay for pairwise real-time calls", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the signaling relay
    Serve {
        /// Bind address, overrides the config file
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("beckon=info".parse().unwrap())
                .add_directive("beckon_relay=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr } => {
            let config = Config::load()?;
            let addr = addr.unwrap_or_else(|| config.server.bind_address.clone());

            let state = RelayState::new();
            let app = Router::new()
                .route("/", any(ws_handler))
                .with_state(state);

            println!("Starting beckon relay on {}", addr);
            println!("Signaling endpoint: ws://{}", addr);

            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .context("Failed to bind relay address")?;
            axum::serve(listener, app).await?;
        }
        Commands::Config => {
            let config = Config::load()?;
            println!("Config file: {}", get_config_path().display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
