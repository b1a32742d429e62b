use crawlsink::admin::Administrator;
use crawlsink::config::Config;
use crawlsink::telemetry;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::process::exit;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            exit(1);
        }
    };

    let filter = match EnvFilter::try_new(&config.log_level) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("invalid LOG_LEVEL {:?}: {err}", config.log_level);
            exit(1);
        }
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "failed to install metrics recorder");
            exit(1);
        }
    };
    telemetry::describe();

    let admin = match Administrator::from_config(&config).await {
        Ok(admin) => Arc::new(admin),
        Err(err) => {
            error!(error = %err, "failed to build pipeline");
            exit(1);
        }
    };

    // One root token governs the HTTP server and the worker pool.
    let root = CancellationToken::new();
    spawn_signal_handler(root.clone());

    admin.process_and_index(root.clone()).await;

    if let Err(err) = admin
        .serve(&config.server_port, metrics_handle, root.clone())
        .await
    {
        error!(error = %err, "HTTP service failed");
        exit(1);
    }

    // Server has drained; finish whatever is still buffered.
    admin.stop().await;
    info!("shutdown complete");
}

fn spawn_signal_handler(root: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    error!(error = %err, "failed to register SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("received shutdown signal, initiating graceful shutdown");
        root.cancel();
    });
}
