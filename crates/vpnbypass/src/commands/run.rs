//! `run`: long-lived engine with monitoring, auto-apply and scheduled
//! refresh. Settings changes made by the engine are written back to the
//! config file as they happen.

use tracing::{info, warn};
use vpnbypass_core::Engine;

use crate::config::{self, Config};
use crate::error::CliError;

pub async fn handle(mut cfg: Config) -> Result<(), CliError> {
    let engine = Engine::new(config::engine_config(&cfg), cfg.to_settings());
    engine.start().await?;
    info!(config = %config::config_path().display(), "vpnbypass running");

    let mut snapshots = engine.subscribe();
    let mut settings_version = snapshots.current().settings_version;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            snap = snapshots.changed() => {
                let Some(snap) = snap else { break };
                if snap.settings_version == settings_version {
                    continue;
                }
                settings_version = snap.settings_version;
                if let Err(e) = config::persist_settings(&mut cfg, &snap.settings) {
                    warn!(error = %e, "failed to save settings");
                }
            }
        }
    }

    info!("shutting down");
    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
