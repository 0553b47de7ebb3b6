use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backtrack::{
    api::{self, SecurityConfig},
    client::BacktrackClient,
    db,
};

#[derive(Parser)]
#[command(name = "backtrack")]
#[command(about = "Scrum backlog tracker: projects, sprints, backlog items and tasks")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Server options used when no subcommand is given
    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Backtrack server
    Serve(ServeArgs),
    /// Check whether a server is running
    Status {
        /// Server base URL
        #[arg(long, env = "BACKTRACK_URL", default_value = backtrack::client::DEFAULT_URL)]
        url: String,
    },
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Address to bind the HTTP API to
    #[arg(long, env = "BACKTRACK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port for HTTP API
    #[arg(short, long, env = "BACKTRACK_PORT", default_value_t = 3000)]
    port: u16,

    /// SQLite database file (defaults to the platform data directory)
    #[arg(long, env = "BACKTRACK_DATABASE")]
    database: Option<PathBuf>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "backtrack=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let db = match args.database {
        Some(path) => {
            tracing::info!("Using database at {}", path.display());
            db::Database::open(path)?
        }
        None => db::Database::open_default()?,
    };
    db.migrate()?;

    let security = SecurityConfig::from_env();
    if security.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    let app = api::create_router_with_security(db, security);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Backtrack server listening on http://{}", addr);

    // Peer addresses identify clients for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn status(url: String) -> anyhow::Result<()> {
    let client = BacktrackClient::new(url, std::env::var("BACKTRACK_API_KEY").ok());
    match client.health().await {
        Ok(health) => {
            println!("Backtrack server at {} is {}", client.base_url(), health.status);
            Ok(())
        }
        Err(e) => {
            println!("Backtrack server at {} is not reachable", client.base_url());
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve(args)) => serve(args).await,
        Some(Commands::Status { url }) => status(url).await,
        // Default: start server
        None => serve(cli.serve).await,
    }
}
