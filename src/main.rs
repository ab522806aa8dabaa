use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use brokerd::{ChannelMap, Config};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "brokerd", version, about = "Segmented, append-only channel broker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a data directory, recover its channels, and serve the HTTP
    /// front-end until SIGINT/SIGTERM.
    Serve {
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
        #[arg(long = "bind")]
        bind_addr: Option<String>,
        #[arg(long = "config")]
        config: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            data_dir,
            bind_addr,
            config,
        } => serve(data_dir, bind_addr, config.as_deref()),
    }
}

fn serve(
    data_dir: Option<PathBuf>,
    bind_addr: Option<String>,
    config_path: Option<&std::path::Path>,
) -> Result<(), Box<dyn Error>> {
    let config = Config::load(config_path, data_dir, bind_addr)?;
    let channel_map = Arc::new(ChannelMap::open_directory_with_segment_size(
        &config.data_dir,
        config.max_segment_size,
    )?);
    log::info!(
        "server id {} ready, listening on {}",
        channel_map.get_uid(),
        config.bind_addr
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let bind_addr = config.bind_addr.clone();
        let app = brokerd::server::router(channel_map, Arc::new(config));
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok::<(), Box<dyn Error>>(())
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
