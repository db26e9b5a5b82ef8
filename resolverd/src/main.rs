//! resolverd, a host-local recursive-stub DNS resolver daemon.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use resolver_core::{EventLoop, Settings};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file with the `[Resolve]` section.
    #[arg(
        long,
        env = "RESOLVERD_CONFIG",
        default_value = "/etc/resolverd/resolverd.conf"
    )]
    config: PathBuf,

    /// Where the resolv.conf view of the upstream servers is published.
    #[arg(
        long,
        env = "RESOLVERD_RESOLV_CONF",
        default_value = "/run/resolverd/resolv.conf"
    )]
    resolv_conf: PathBuf,

    /// Directory where the network manager publishes per-link state.
    #[arg(
        long,
        env = "RESOLVERD_STATE_DIR",
        default_value = "/run/resolverd/netif"
    )]
    state_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // All event sources funnel into one cooperative loop; a single
    // reactor thread is all we need.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings {
        resolv_conf: cli.resolv_conf,
        state_dir: cli.state_dir,
        config_file: cli.config,
    };

    let (mut event_loop, _scope) = EventLoop::new(settings)
        .await
        .context("Failed to start resolver")?;

    tracing::info!("Watching for network changes");

    // `_scope` is where the IPC bus front-end attaches once queries start
    // flowing; keeping it alive keeps the request channel open.
    event_loop.run().await
}
