use asana_image_scraper::{load_config, setup_logging, Cli, CliRunner, ScraperError};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("Starting asana-image-scraper v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let cli_runner = CliRunner::new(config, args.metrics_file.clone())?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx);

    let result = tokio::select! {
        result = cli_runner.run() => {
            info!("Scraping completed");
            result.map(|_| ())
        }
        Ok(()) = shutdown_rx.recv() => {
            info!("Received shutdown signal, abandoning the run");
            Ok(())
        }
    };

    // Sessions of an interrupted run are still open
    cli_runner.shutdown().await;

    if let Err(e) = result {
        match e.downcast_ref::<ScraperError>() {
            Some(err) if err.is_fatal() => error!("Fatal {:?} error: {}", err.kind(), err),
            _ => error!("Application error: {:#}", e),
        }
        std::process::exit(1);
    }

    info!("asana-image-scraper stopped");
    Ok(())
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (mut sigint, mut sigterm) = match (
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
            signal::unix::signal(signal::unix::SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }

        let _ = shutdown_tx.send(());
    })
}
