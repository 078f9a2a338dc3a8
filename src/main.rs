use std::sync::Arc;

use global_notifier::storage::MemoryEngine;
use global_notifier::ChangeNotification;
use global_notifier::ListenIdent;
use global_notifier::NotifierBuilder;
use global_notifier::NotifierConfig;
use global_notifier::NotifierTarget;
use global_notifier::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tracks every realm and logs its changes
struct LoggingTarget;

impl NotifierTarget for LoggingTarget {
    fn filter(
        &self,
        virtual_path: &str,
    ) -> bool {
        info!(virtual_path, "Realm discovered");
        true
    }

    fn realm_observed(
        &self,
        listen_ident: ListenIdent,
    ) {
        info!(listen_ident, "Realm tracked");
    }

    fn realm_changed(
        &self,
        notification: ChangeNotification,
    ) {
        for (object_type, changes) in &notification.changes {
            info!(
                listen_ident = notification.listen_ident,
                virtual_path = %notification.virtual_path,
                object_type = %object_type,
                insertions = changes.insertions.len(),
                deletions = changes.deletions.len(),
                modifications = changes.modifications.len(),
                "Realm changed"
            );
        }
        if notification.is_initial() {
            info!(
                listen_ident = notification.listen_ident,
                virtual_path = %notification.virtual_path,
                version = notification.new_snapshot.version(),
                "Realm available"
            );
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("NOTIFIER_CONFIG").ok();
    let config = NotifierConfig::load(config_path.as_deref())?;

    let notifier = NotifierBuilder::new(config, Arc::new(LoggingTarget))
        .with_memory_backend(MemoryEngine::new())
        .build()?;
    notifier.start().await?;

    info!("Notifier started. Waiting for CTRL+C signal...");
    if let Err(e) = wait_for_shutdown().await {
        error!("Failed to listen for shutdown signals: {:?}", e);
    }

    notifier.shutdown().await?;
    info!("Shutdown completed");
    Ok(())
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}
