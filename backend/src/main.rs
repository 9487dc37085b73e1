//! PlantUML MCP gateway.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use plantuml_mcp::{
    config::{Config, ConfigOverrides},
    create_app, logging,
    state::GatewayState,
    transport::{self, Transport},
};

/// PlantUML diagrams for MCP clients over stdio, SSE or Streamable HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport to serve
    #[arg(long, value_enum)]
    transport: Option<Transport>,

    /// Listen host for the HTTP transports
    #[arg(long)]
    host: Option<String>,

    /// Listen port for the HTTP transports
    #[arg(long)]
    port: Option<u16>,

    /// API key required from clients (enables authentication)
    #[arg(long)]
    api_key: Option<String>,

    /// PlantUML server base URL
    #[arg(long)]
    plantuml_server: Option<String>,

    /// Log filter (e.g. "info", "plantuml_mcp=debug")
    #[arg(long)]
    log_level: Option<String>,

    /// Additional config file, merged above the user and local ones
    #[arg(long, env = "PLANTUML_MCP_CONFIG")]
    config: Option<PathBuf>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        Self {
            transport: args.transport,
            host: args.host,
            port: args.port,
            api_key: args.api_key,
            plantuml_server: args.plantuml_server,
            log_level: args.log_level,
            config_file: args.config,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_figment(&args.into())?;

    // Held for the process lifetime so the file writer keeps flushing
    let _log_guard = logging::init(&config)?;

    run(config)
}

#[tokio::main]
async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        "Starting PlantUML MCP gateway ({} transport, PlantUML server {})",
        config.transport, config.plantuml_server
    );
    let state = GatewayState::from_config(&config)?;

    match config.transport {
        Transport::Stdio => {
            transport::stdio::serve(state, tokio::io::stdin(), tokio::io::stdout()).await?;
            info!("stdio session finished, exiting");
        }
        Transport::Sse | Transport::Http => serve_http(config, state).await?,
    }

    Ok(())
}

async fn serve_http(config: Config, state: GatewayState) -> anyhow::Result<()> {
    let addr = config.addr()?;
    let app = create_app(state.clone(), config.transport);

    // Periodically close idle, unbound sessions
    let sessions = state.sessions().clone();
    let max_idle = config.session_idle;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            sessions.cleanup_stale(max_idle).await;
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    // Set up graceful shutdown handler
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down");
    Ok(())
}
