use logbatch::ingest::{self, PumpEnd};
use logbatch::{Config, Dispatcher, Drain, HttpDeliveryClient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exceptional startup failure: log and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("LOGBATCH_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid LOGBATCH_LOG_LEVEL: {val:?}, defaulting to INFO");
                None
            })
        })
        .unwrap_or(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

fn main() {
    setup_logging();
    setup_rustls();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fatal("failed to start runtime", &e));
    runtime.block_on(run());
    // The stdin reader may still be blocked in a read that cannot be
    // cancelled; exit without waiting for it.
    runtime.shutdown_background();
}

async fn run() {
    let config = Config::load().unwrap_or_else(|e| fatal("config error", &e));
    let client = HttpDeliveryClient::new(config.request_timeout)
        .unwrap_or_else(|e| fatal("failed to build delivery client", &e));
    let dispatcher = Dispatcher::new(&config, client)
        .unwrap_or_else(|e| fatal("failed to start dispatcher", &e));

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    match ingest::pump(stdin, &dispatcher, &cancel).await {
        Ok((PumpEnd::Eof, appended)) => debug!(appended, "input closed"),
        Ok((PumpEnd::Cancelled, appended)) => debug!(appended, "input interrupted"),
        Err(e) => error!(error = %e, "failed to read input"),
    }

    // An in-flight delivery is awaited to completion; a second signal exits
    // without waiting.
    tokio::select! {
        drain = dispatcher.drain() => match drain {
            Drain::Flushed => info!("final batch sent"),
            Drain::InFlight => debug!("in-flight delivery completed"),
            Drain::Empty => debug!("nothing left to send"),
        },
        () = shutdown_signal() => warn!("interrupted while draining, exiting with a delivery still in flight"),
    }
}

/// Resolves on SIGINT, or on SIGTERM where supported.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("received SIGINT"),
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        },
        () = terminate => info!("received SIGTERM"),
    }
}
