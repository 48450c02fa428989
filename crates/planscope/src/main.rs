use clap::Parser;
use planscope::{run_once, run_polling, AppError, GraphWriter, Settings};
use planscope_client::{ApiClient, QueryPoller};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file; defaults to PLANSCOPE_CONFIG_PATH or the bundled default.
    #[arg(short, long)]
    config: Option<String>,

    /// Follow this query instead of the latest user query.
    #[arg(short, long)]
    query_id: Option<String>,

    /// Print one graph and exit.
    #[arg(long)]
    once: bool,

    /// Write graphs to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();
    let settings = Settings::new(args.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let client = ApiClient::new(&settings.api_base_url, settings.request_timeout())?;
    info!(base_url = client.base_url(), "Using query-status service");
    let mut poller = QueryPoller::new(client, settings.graph.clone())
        .with_interval(settings.poll_interval())
        .with_query_id(args.query_id);
    let writer = GraphWriter::new(args.output, args.pretty);

    if args.once {
        return run_once(&mut poller, &writer).await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("Received ctrl-c, stopping");
        let _ = shutdown_tx.send(true);
    });
    run_polling(&mut poller, &writer, shutdown_rx).await;
    Ok(())
}
