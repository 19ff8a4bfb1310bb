//! Daemon wiring: preferences, coordinator, UDS server, signals.

use std::sync::Arc;
use std::time::Duration;

use tabnap_host::{CommandQueue, SysfsPowerSource};

use crate::cli::DaemonOpts;
use crate::clock::Clock;
use crate::coordinator::{Coordinator, CoordinatorSettings};
use crate::prefs_store::{PrefsStore, default_prefs_path};
use crate::server;

pub(crate) fn settings_from(opts: &DaemonOpts) -> CoordinatorSettings {
    CoordinatorSettings {
        census_debounce: Duration::from_millis(opts.census_debounce_ms),
        introduce_timeout: Duration::from_millis(opts.introduce_timeout_ms),
        restore_probe: opts.restore_probe,
        probe_timeout: Duration::from_millis(opts.probe_timeout_ms),
        clock: Clock::wall(),
    }
}

pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let prefs_path = opts.prefs.clone().unwrap_or_else(default_prefs_path);
    let prefs = PrefsStore::open(&prefs_path)?;

    let coordinator = Coordinator::start(
        Arc::new(CommandQueue::new()),
        prefs.clone(),
        Arc::new(SysfsPowerSource::new(&opts.power_supply_dir)),
        settings_from(&opts),
    );

    // Start UDS server
    let server_coordinator = coordinator.clone();
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_coordinator).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    #[cfg(unix)]
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(mut sighup) => {
            let prefs = prefs.clone();
            tokio::spawn(async move {
                while sighup.recv().await.is_some() {
                    if let Err(e) = prefs.reload() {
                        tracing::warn!("preferences reload failed: {e}");
                    }
                }
            });
        }
        Err(e) => tracing::warn!("SIGHUP reload disabled: {e}"),
    }

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}
