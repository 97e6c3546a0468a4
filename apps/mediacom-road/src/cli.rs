use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::{SinkExt, StreamExt};
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error};

use crate::config::{Config, DEFAULT_PORT};
use crate::discovery::{self, ScanOptions};
use crate::signaling::{ClientMessage, JoinRoom, Role, ServerMessage};

#[derive(Parser, Debug)]
#[command(name = "mediacom-road")]
#[command(about = "MediaCom signaling broker, LAN discovery and watch client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Port to listen on (overrides MEDIACOM_ROAD_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Address to bind (overrides MEDIACOM_ROAD_BIND)
    #[arg(long, global = true)]
    pub bind: Option<IpAddr>,
}

impl Cli {
    /// Apply command-line overrides on top of the environment
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the signaling broker (default)
    Serve,

    /// Scan a /24 subnet for running brokers
    Discover {
        /// First three octets, e.g. 192.168.0
        #[arg(long)]
        prefix: String,

        /// Stop once a server hosting this room answers
        #[arg(long)]
        room: Option<String>,

        /// Stop at the first server that answers
        #[arg(long)]
        first: bool,

        /// Probes in flight at once
        #[arg(long, default_value_t = 32)]
        concurrency: usize,

        /// Per-probe timeout
        #[arg(long, default_value_t = 1500)]
        timeout_ms: u64,
    },

    /// Join a room and print every event the broker sends
    Watch {
        /// Broker URL (e.g., ws://localhost:3000)
        #[arg(short, long, default_value = "ws://localhost:3000")]
        url: String,

        /// Room to join
        #[arg(short, long)]
        room: String,

        /// Display name
        #[arg(short, long, default_value = "watcher")]
        name: String,

        #[arg(long, value_enum, default_value_t = WatchRole::Member)]
        role: WatchRole,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum WatchRole {
    Director,
    Member,
}

impl From<WatchRole> for Role {
    fn from(role: WatchRole) -> Self {
        match role {
            WatchRole::Director => Role::Director,
            WatchRole::Member => Role::Member,
        }
    }
}

pub async fn run_discover(
    prefix: String,
    port: Option<u16>,
    room: Option<String>,
    first: bool,
    concurrency: usize,
    timeout_ms: u64,
) -> Result<()> {
    let options = ScanOptions {
        port: port.unwrap_or(DEFAULT_PORT),
        concurrency,
        probe_timeout: Duration::from_millis(timeout_ms),
        first_only: first,
        room: room.clone(),
    };

    let servers = discovery::scan_subnet(&prefix, &options).await?;
    if servers.is_empty() {
        return Err(anyhow::anyhow!("No MediaCom server found on {}.0/24", prefix));
    }

    if let Some(room) = &room {
        if !servers.iter().any(|s| s.has_room(room)) {
            return Err(anyhow::anyhow!("Room {} no longer exists", room));
        }
    }

    for server in servers {
        println!("{}:{}", server.host, server.port);
        for room in server.rooms {
            println!("  {} ({} users)", room.name, room.user_count);
        }
    }
    Ok(())
}

pub async fn run_watch(url: String, room: String, name: String, role: WatchRole) -> Result<()> {
    let ws_url = format!("{}/ws", url.trim_end_matches('/'));
    debug!("Connecting to {}", ws_url);

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&ws_url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("Failed to connect to {}: {}", ws_url, e);
            return Err(anyhow::anyhow!("Connection failed: {}", e));
        }
        Err(_) => {
            return Err(anyhow::anyhow!(
                "Connection timeout - is the broker running?"
            ));
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let join = ClientMessage::JoinRoom(JoinRoom::new(room, name, role.into()));
    write
        .send(Message::Text(serde_json::to_string(&join)?.into()))
        .await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                write.send(Message::Close(None)).await?;
                return Ok(());
            }
            frame = read.next() => {
                let Some(frame) = frame else {
                    return Err(anyhow::anyhow!("Connection closed by broker"));
                };
                if let Message::Text(text) = frame? {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(event) => print_event(&event),
                        Err(e) => debug!("Unrecognized frame {}: {}", text.as_str(), e),
                    }
                }
            }
        }
    }
}

fn print_event(event: &ServerMessage) {
    match event {
        ServerMessage::Connected { id } => println!("connected as {}", id),
        ServerMessage::RoomUsers(users) => {
            println!("room-users ({}):", users.len());
            for user in users {
                println!(
                    "  {} {} [{:?}]{}",
                    user.id,
                    user.name,
                    user.role,
                    if user.is_speaking { " speaking" } else { "" }
                );
            }
        }
        ServerMessage::UserJoined(user) => {
            println!("user-joined {} {} [{:?}]", user.id, user.name, user.role)
        }
        ServerMessage::UserLeft(id) => println!("user-left {}", id),
        ServerMessage::UserSpeaking { id, is_speaking } => {
            println!("user-speaking {} {}", id, is_speaking)
        }
        ServerMessage::Signal { from, signal } => println!("signal from {}: {}", from, signal),
        ServerMessage::Pong => println!("pong"),
        ServerMessage::Error { message } => eprintln!("error: {}", message),
    }
}
