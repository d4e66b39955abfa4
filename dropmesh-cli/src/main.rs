use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dropmesh_client::{
    ClientConfig, ClientEvent, DirectorySink, DropClient, Progress, ReceptionEvent, SendStatus,
};
use dropmesh_core::{IceServerConfig, RoomId};
use dropmesh_server::ServerConfig;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dropmesh", version, about = "Peer-to-peer file drop over WebRTC")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// STUN/TURN URL handed to clients; repeat for several.
        #[arg(long = "ice", value_name = "URL")]
        ice: Vec<String>,
    },
    /// Send files to everyone in a room.
    Send {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Join this room instead of creating one.
        #[arg(long)]
        room: Option<String>,

        #[arg(long, env = "DROPMESH_SERVER")]
        server: Option<String>,

        /// Open links to wait for before sending.
        #[arg(long, default_value_t = 1)]
        peers: usize,
    },
    /// Join a room and save whatever arrives.
    Receive {
        room: String,

        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        #[arg(long, env = "DROPMESH_SERVER")]
        server: Option<String>,

        /// Keep receiving after the first file.
        #[arg(long)]
        stay_open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Commands::Serve { bind, ice } => serve(bind, ice).await,
        Commands::Send {
            files,
            room,
            server,
            peers,
        } => send(files, room, server, peers).await,
        Commands::Receive {
            room,
            out,
            server,
            stay_open,
        } => receive(room, out, server, stay_open).await,
    }
}

async fn serve(bind: Option<SocketAddr>, ice: Vec<String>) -> Result<()> {
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if !ice.is_empty() {
        config.ice_servers = ice.into_iter().map(IceServerConfig::from_url).collect();
    }

    println!(
        "{} {}",
        "📡 Relay listening on".green().bold(),
        format!("ws://{}/ws", config.bind_addr).cyan()
    );
    dropmesh_server::serve(config).await
}

fn client_config(server: Option<String>) -> ClientConfig {
    let config = ClientConfig::from_env();
    match server {
        Some(url) => config.with_server_url(url),
        None => config,
    }
}

async fn send(
    files: Vec<PathBuf>,
    room: Option<String>,
    server: Option<String>,
    peers: usize,
) -> Result<()> {
    for path in &files {
        anyhow::ensure!(path.is_file(), "{} is not a file", path.display());
    }

    let config = client_config(server);
    let (client, events) = DropClient::connect(config.clone(), Arc::new(DirectorySink::new(".")))
        .await
        .with_context(|| format!("Failed to reach relay at {}", config.server_url))?;
    tokio::spawn(log_events(events));

    let room_id = room.map(RoomId::from).unwrap_or_else(RoomId::generate);
    client.join(room_id.clone())?;
    client.wait_for_room().await?;
    println!("{} {}", "🔑 Room:".green().bold(), room_id.to_string().bold());

    println!("{}", format!("⏳ Waiting for {peers} peer(s)...").cyan());
    tokio::select! {
        open = client.wait_for_peers(peers) => { open?; }
        _ = tokio::signal::ctrl_c() => {
            client.leave().await?;
            return Ok(());
        }
    }

    for path in &files {
        let name = path.display().to_string();
        println!("{} {}", "📦 Sending".cyan(), name.bold());
        let report = client
            .send_file(path, |progress| print_progress(&name, &progress))
            .await
            .with_context(|| format!("Failed to send {name}"))?;
        println!();

        match report.status {
            SendStatus::Completed => println!(
                "{} {} to {} peer(s)",
                "✅ Sent".green().bold(),
                report.name,
                report.delivered.len()
            ),
            SendStatus::Aborted => println!("{} every peer left", "⚠️  Aborted:".yellow().bold()),
            SendStatus::Failed(reason) => println!("{} {}", "❌ Failed:".red().bold(), reason),
        }
    }

    client.leave().await?;
    client.shutdown();
    Ok(())
}

async fn receive(room: String, out: PathBuf, server: Option<String>, stay_open: bool) -> Result<()> {
    tokio::fs::create_dir_all(&out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let config = client_config(server);
    let (client, mut events) = DropClient::connect(config.clone(), Arc::new(DirectorySink::new(&out)))
        .await
        .with_context(|| format!("Failed to reach relay at {}", config.server_url))?;

    client.join(RoomId::from(room.as_str()))?;
    client.wait_for_room().await?;
    println!(
        "{} {} {}",
        "📥 Joined".green().bold(),
        room.bold(),
        format!("(saving to {})", out.display()).dimmed()
    );

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = event else { break };

        let done = match event {
            ClientEvent::Reception(ReceptionEvent::Progress { name, progress, .. }) => {
                print_progress(&name, &progress);
                false
            }
            ClientEvent::Reception(ReceptionEvent::Completed { name, path, .. }) => {
                println!();
                println!("{} {} -> {}", "✅ Received".green().bold(), name, path.display());
                !stay_open
            }
            ClientEvent::Reception(ReceptionEvent::Failed { name, reason, .. }) => {
                println!();
                println!("{} {}: {}", "❌ Could not save".red().bold(), name, reason);
                false
            }
            ClientEvent::Reception(ReceptionEvent::Aborted { name, peer_id }) => {
                println!();
                println!("{} {} ({} left)", "⚠️  Aborted".yellow().bold(), name, peer_id);
                false
            }
            ClientEvent::Reception(ReceptionEvent::Clipboard { peer_id, text }) => {
                println!("{} {}: {}", "📋 Clipboard from".cyan(), peer_id, text);
                false
            }
            ClientEvent::RelayLost => {
                println!("{}", "⚠️  Relay connection lost".yellow());
                false
            }
            other => {
                debug!("{:?}", other);
                false
            }
        };
        if done {
            break;
        }
    }

    client.leave().await?;
    client.shutdown();
    Ok(())
}

async fn log_events(mut events: mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::PeerConnected(peer_id) => {
                println!("{} {}", "🔗 Connected".green(), peer_id)
            }
            ClientEvent::PeerDisconnected(peer_id) => {
                println!("{} {}", "🔌 Disconnected".yellow(), peer_id)
            }
            ClientEvent::RelayLost => println!("{}", "⚠️  Relay connection lost".yellow()),
            other => debug!("{:?}", other),
        }
    }
}

fn print_progress(name: &str, progress: &Progress) {
    print!(
        "\r   {} {:>6.2}% {:>10.1} KiB/s",
        name,
        progress.percent(),
        progress.bytes_per_sec / 1024.0
    );
    let _ = std::io::stdout().flush();
}
