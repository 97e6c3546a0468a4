use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use mediacom_road::{
    cli::{self, Cli, Commands},
    config::Config,
    hub::HubHandle,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);

    if let Err(e) = init_tracing(&config.log_filter) {
        eprintln!("{e}");
    }

    let result = match cli.command {
        Some(Commands::Discover {
            prefix,
            room,
            first,
            concurrency,
            timeout_ms,
        }) => cli::run_discover(prefix, cli.port, room, first, concurrency, timeout_ms).await,
        Some(Commands::Watch {
            url,
            room,
            name,
            role,
        }) => cli::run_watch(url, room, name, role).await,
        Some(Commands::Serve) | None => run_server(config).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let (hub, _hub_task) = HubHandle::spawn(config.relay_policy());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        same_room_signals = config.same_room_signals,
        "MediaCom signaling server listening"
    );

    mediacom_road::serve(listener, hub)
        .await
        .context("server stopped")
}
