mod api;
mod app;
mod config;
mod error;
mod monitor;
mod ui;

use std::collections::BTreeSet;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::time::Duration;

use api::poller::run_poller;
use api::yahoo::YahooClient;
use app::App;
use clap::Parser;
use config::Args;
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};
use monitor::ObservationStore;
use tokio::sync::{mpsc, watch};
use ui::dashboard::Dashboard;

fn init_logger(args: &Args) -> error::Result<()> {
    let level = args.log_level()?;
    let target = match &args.log_file {
        Some(path) => env_logger::Target::Pipe(Box::new(File::create(path)?)),
        // Keep logs separate from the TUI on stdout
        None => env_logger::Target::Stderr,
    };

    Builder::new()
        .filter_level(level.min(LevelFilter::Info))
        .filter_module("stockwatch", level)
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(target)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();
    args.validate()?;
    init_logger(&args)?;

    info!("Starting StockWatch...");

    let provider = YahooClient::new(args.provider_url.clone(), args.request_timeout())?;

    // Create channels
    let (symbols_tx, symbols_rx) = watch::channel(BTreeSet::new());
    let (event_tx, event_rx) = mpsc::channel(100);

    let mut app = App::new(
        ObservationStore::new(args.history_limit),
        symbols_tx,
        args.export_path.clone(),
    );
    app.track_initial(&args.initial_symbols());

    let poller_handle = tokio::spawn(run_poller(
        provider,
        symbols_rx,
        event_tx,
        args.poll_interval(),
    ));

    // The dashboard blocks on terminal input, so it keeps this thread to itself.
    let mut dashboard = Dashboard::new(app, args.poll_interval());
    let result = tokio::task::block_in_place(|| dashboard.run(event_rx));
    if let Err(e) = &result {
        error!("Dashboard error: {}", e);
    }
    info!(
        "Tracked {} symbol(s) at exit",
        dashboard.app().store().len()
    );
    // Dropping the symbol publisher stops the poller.
    drop(dashboard);

    match tokio::time::timeout(Duration::from_secs(2), poller_handle).await {
        Ok(Err(e)) => error!("Polling task failed: {}", e),
        Err(_) => warn!("Polling task did not stop in time"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    result?;
    Ok(())
}
