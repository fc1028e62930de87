use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use drake_worker::config::WorkerConfig;
use drake_worker::executor::dispatcher;
use drake_worker::substrate::kubernetes::KubernetesSubstrate;
use drake_worker::{event, substrate::Substrate};

#[tokio::main]
async fn main() -> ExitCode {
    // Tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("DRAKE_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();

    let config = Arc::new(WorkerConfig::default());

    let event = match event::load(&config.event_path).await {
        Ok(event) => Arc::new(event),
        Err(err) => {
            tracing::error!(error = %err, "could not load event");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        event = %event.id,
        source = %event.source,
        kind = %event.kind,
        "starting worker",
    );

    let substrate: Arc<dyn Substrate> = match KubernetesSubstrate::connect().await {
        Ok(substrate) => Arc::new(substrate),
        Err(err) => {
            tracing::error!(error = %err, "could not connect to the cluster");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = dispatcher::execute_build(cancel.clone(), substrate, event, config).await;

    match result {
        Ok(()) if !cancel.is_cancelled() => ExitCode::SUCCESS,
        Ok(()) => {
            tracing::warn!("build was cancelled");
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!(error = %err, "build failed");
            ExitCode::FAILURE
        }
    }
}

/// Cancel the root context cooperatively on SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
    cancel.cancel();
}
