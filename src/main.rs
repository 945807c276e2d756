use anyhow::Context;
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};

use netmon::broadcast::{BroadcastSettings, Broadcaster};
use netmon::config::{Cli, Command, Config};
use netmon::connections::SystemEnumerator;
use netmon::sniff::{self, CaptureProbe};
use netmon::state::MonitorState;
use netmon::stats::Aggregator;
use netmon::{client, dashboard, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level)?;

    match cli.command {
        None => serve(cli.serve).await,
        Some(Command::Watch { url, count }) => Ok(client::watch(&url, count).await?),
        Some(Command::Devices) => {
            for (name, description) in sniff::list_devices()? {
                println!("{name}\t{}", description.unwrap_or_default());
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let running = Arc::new(AtomicBool::new(true));
    let shutdown = Arc::new(Notify::new());
    {
        let running = Arc::clone(&running);
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            info!("interrupt received, shutting down");
            shutdown.notify_one();
        })
        .context("installing interrupt handler")?;
    }

    let aggregator = Arc::new(Aggregator::new(config.max_packets));
    let capture = CaptureProbe::open(config.interface.as_deref(), !config.no_capture);
    let state = MonitorState::new(Arc::clone(&aggregator), capture.is_available());

    let listener = match dashboard::bind(config.bind_addr()) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "cannot start dashboard");
            return Err(e.into());
        }
    };

    // capture threads are detached; they stop with the process
    let _capture = capture.start(aggregator, Arc::clone(&running));

    let broadcaster = Broadcaster::new(
        state.clone(),
        Arc::new(SystemEnumerator::new()),
        BroadcastSettings {
            interval: config.interval(),
            max_connections: config.connections_per_snapshot(),
            recent_packets: config.recent_packets_per_snapshot(),
        },
    );
    let broadcast_loop = tokio::spawn(broadcaster.run(Arc::clone(&running)));

    info!(
        url = %format!("http://{}", config.bind_addr()),
        capture = state.capture_available,
        "network monitor started"
    );

    let served = dashboard::serve(listener, state, async move {
        shutdown.notified().await;
    })
    .await;

    running.store(false, Ordering::SeqCst);
    if let Err(e) = broadcast_loop.await {
        error!(error = %e, "broadcast loop panicked");
    }
    info!("monitor stopped");

    served.map_err(Into::into)
}
