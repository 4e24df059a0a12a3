//! linechat
//!
//! Usage:
//!   linechat server                       # Run the chat server on 127.0.0.1:8000
//!   linechat server --port 9000           # Run on a specific port
//!   linechat client --host 10.0.0.5       # Connect the console client

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use linechat::{ChatClient, ChatClientConfig, ChatConfig, ChatServer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "linechat",
    about = "Line-oriented TCP chat with persistent history",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chat server
    Server(ServerArgs),
    /// Connect an interactive console client
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
struct ServerArgs {
    #[arg(long, env = "LINECHAT_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "LINECHAT_PORT", default_value_t = 8000)]
    port: u16,

    #[arg(
        long = "history-file",
        value_name = "PATH",
        env = "LINECHAT_HISTORY_FILE",
        default_value = "history.jsonl"
    )]
    history_file: PathBuf,

    #[arg(
        long,
        env = "LINECHAT_RESTORE_LAST_MESSAGES",
        default_value_t = 20,
        help = "Public messages shown to a newly joined client"
    )]
    restore_last_messages: usize,

    #[arg(long, env = "LINECHAT_MAX_LINE_LENGTH", default_value_t = 2048)]
    max_line_length: usize,

    #[arg(long, env = "LINECHAT_MAX_CONNECTIONS", default_value_t = 1000)]
    max_connections: usize,

    #[arg(
        long,
        env = "LINECHAT_PRIVATE_REPLAY_FILTER",
        help = "On /reconnect, only replay private messages the client sent or received"
    )]
    private_replay_filter: bool,
}

impl From<ServerArgs> for ChatConfig {
    fn from(args: ServerArgs) -> Self {
        ChatConfig {
            host: args.host,
            port: args.port,
            history_path: args.history_file,
            restore_last_messages: args.restore_last_messages,
            max_line_length: args.max_line_length,
            max_connections: args.max_connections,
            private_replay_filter: args.private_replay_filter,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ClientArgs {
    #[arg(long, env = "LINECHAT_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "LINECHAT_PORT", default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Server(args) => run_server(args.into()).await,
        Command::Client(args) => run_client(args).await,
    }
}

async fn run_server(config: ChatConfig) -> anyhow::Result<()> {
    info!("Starting the server on host {} and port {}", config.host, config.port);
    info!("  - Restore last messages: {}", config.restore_last_messages);
    info!("  - Max connections: {}", config.max_connections);

    let server = ChatServer::bind(config)
        .await
        .context("failed to start chat server")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    server
        .run_until(shutdown)
        .await
        .context("chat server stopped with an error")?;
    info!("The server has shut down");
    Ok(())
}

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let config = ChatClientConfig {
        host: args.host,
        port: args.port,
        ..ChatClientConfig::default()
    };

    let client = ChatClient::connect(&config)
        .await
        .with_context(|| format!("failed to connect to the server at {}", config.server_addr()))?;
    client.run().await.context("chat client stopped with an error")?;
    Ok(())
}
