use anyhow::Context;
use clap::Parser;
use furrow::catalog::Catalog;
use furrow::config::Config;
use furrow::notify::{LogNotifier, Notifier};
use furrow::session::supervisor::Supervisor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "furrow", about = "Unattended keeper for a farming idle game", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "furrow.toml")]
    config: PathBuf,

    /// Login credential, one per account session.
    #[arg(required = true)]
    credentials: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("furrow=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.config).context("loading config")?);
    let catalog = Arc::new(Catalog::load(&config.catalog_path));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let stop = CancellationToken::new();
    let supervisor = Supervisor::start(config, catalog, notifier, stop.clone());

    let mut started = 0usize;
    for credential in &cli.credentials {
        match supervisor.add(credential).await {
            Ok(()) => started += 1,
            Err(err) => warn!(%err, "session failed to start"),
        }
    }
    if started == 0 {
        error!("no session came up");
        anyhow::bail!("no session came up");
    }
    for row in supervisor.list() {
        info!(
            credential = %row.credential_prefix,
            name = %row.name,
            status = row.status.as_str(),
            "session running"
        );
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    supervisor.stop_all().await;
    stop.cancel();
    Ok(())
}
