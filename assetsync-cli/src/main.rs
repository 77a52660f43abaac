//! AssetSync CLI
//!
//! Runs the asset server and offers a few commands for poking at a running one.

mod client;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use assetsync_core::{
    ClientSync, FsEventBatch, FsObject, SessionIdMessage, WsEnvelope, FS_EVENTS_MESSAGE,
    SESSION_ID_MESSAGE,
};
use assetsync_server::{run_server, ServerConfig};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::client::AssetSyncClient;

#[derive(Parser)]
#[command(name = "assetsync")]
#[command(about = "Asset sync backend for the multi-client scene editor")]
#[command(version)]
struct Cli {
    /// Server host (overrides HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// HTTP port of the server (overrides PORT)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// WebSocket port (overrides WS_PORT)
    #[arg(long, global = true)]
    ws_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket servers
    Serve {
        /// Directory holding the projects
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Milliseconds between filesystem event pushes
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Check whether a server is running
    Status,

    /// List the server's projects
    Projects,

    /// Follow a directory and print its listing whenever it changes
    Watch {
        /// Project to open
        project: String,

        /// Directory inside the project's assets
        #[arg(short, long, default_value = "")]
        dir: String,
    },
}

impl Cli {
    /// Layer explicit flags over `config`; anything not given keeps its value
    fn apply(&self, mut config: ServerConfig) -> Result<ServerConfig> {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ws_port) = self.ws_port {
            config.ws_port = ws_port;
        }
        if let Commands::Serve { root, interval } = &self.command {
            if let Some(root) = root {
                config.projects_root = root.clone();
            }
            if let Some(ms) = *interval {
                anyhow::ensure!(ms > 0, "--interval must be positive");
                config.fs_events_interval = Duration::from_millis(ms);
            }
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("assetsync=info".parse()?)
                .add_directive("assetsync_server=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.apply(ServerConfig::from_env()?)?;

    match &cli.command {
        Commands::Serve { .. } => {
            cmd_serve(config).await?;
        }
        Commands::Status => {
            cmd_status(&config.host, config.port).await?;
        }
        Commands::Projects => {
            cmd_projects(&config.host, config.port).await?;
        }
        Commands::Watch { project, dir } => {
            cmd_watch(&config.host, config.port, config.ws_port, project, dir).await?;
        }
    }

    Ok(())
}

async fn cmd_serve(config: ServerConfig) -> Result<()> {
    println!("Starting AssetSync server on {}...", config.http_addr());
    run_server(config).await
}

async fn cmd_status(host: &str, port: u16) -> Result<()> {
    let client = AssetSyncClient::new(host, port);

    match client.check_health().await {
        Ok(true) => {
            println!("Server is running on {}:{}", host, port);
            let ctx = client.get_loaded_project().await?;
            match ctx.project {
                Some(project) => println!("Loaded project: {} (dir {:?})", project, ctx.dir),
                None => println!("No project loaded."),
            }
        }
        _ => {
            println!("Server is not running.");
            println!("Start it with: assetsync serve");
        }
    }

    Ok(())
}

async fn cmd_projects(host: &str, port: u16) -> Result<()> {
    let client = AssetSyncClient::new(host, port);
    let projects = client
        .get_projects()
        .await
        .context("Failed to reach the server")?;

    if projects.is_empty() {
        println!("No projects.");
    }
    for project in projects {
        println!("{}", project);
    }
    Ok(())
}

fn print_listing(project: &str, dir: &str, listing: &[FsObject]) {
    println!("{}/{} ({} entries)", project, dir, listing.len());
    for entry in listing {
        if entry.is_folder() {
            println!("  {}/  [{} files]", entry.name, entry.num_files.unwrap_or(0));
        } else {
            println!("  {}  {} bytes", entry.name, entry.size);
        }
    }
}

/// Open a session, then re-fetch the directory whenever a pushed batch touches it
async fn cmd_watch(host: &str, port: u16, ws_port: u16, project: &str, dir: &str) -> Result<()> {
    let url = format!("ws://{}:{}/", host, ws_port);
    let (mut socket, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    let mut client = AssetSyncClient::new(host, port);
    let mut sync = ClientSync::new();

    while let Some(frame) = socket.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let envelope = match WsEnvelope::parse(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Ignoring malformed push: {}", e);
                continue;
            }
        };

        match envelope.id.as_str() {
            SESSION_ID_MESSAGE => {
                let hello: SessionIdMessage = envelope.decode()?;
                tracing::info!("Session {}", hello.session_id);
                client = client.with_session(hello.session_id);

                client.load_project(project).await?;
                let listing = client.get_folder(project, dir).await?;
                sync.open(project, dir);
                print_listing(project, dir, &listing);
            }
            FS_EVENTS_MESSAGE => {
                let batch: FsEventBatch = envelope.decode()?;
                tracing::debug!("{} filesystem events", batch.events.len());
                if let Some((project, dir)) = sync.on_fs_events(&batch) {
                    let listing = client.get_folder(project, dir).await?;
                    print_listing(project, dir, &listing);
                }
            }
            other => tracing::debug!("Unhandled push {}", other),
        }
    }

    println!("Server closed the connection.");
    Ok(())
}
