use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::task;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::AdminWatcher;
use super::ControlEvent;
use super::Responder;
use crate::notifier::NotifierTarget;
use crate::Error;
use crate::Result;

/// Single execution context for discovery and accessor requests.
///
/// The loop owns the [`AdminWatcher`], so `on_admin_change`, `get_virtual_path` and
/// `get_snapshot` can never overlap.
pub(crate) struct ControlLoop {
    watcher: AdminWatcher,
    target: Arc<dyn NotifierTarget>,
    /// Woken by admin commits. Several wakeups before the loop gets to it collapse into one run.
    admin_signal: Arc<Notify>,
    event_rx: mpsc::Receiver<ControlEvent>,
    shutdown_signal: watch::Receiver<()>,
}

impl ControlLoop {
    pub(crate) fn new(
        watcher: AdminWatcher,
        target: Arc<dyn NotifierTarget>,
        event_rx: mpsc::Receiver<ControlEvent>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            watcher,
            target,
            admin_signal: Arc::new(Notify::new()),
            event_rx,
            shutdown_signal,
        }
    }

    /// Serve until shutdown is signalled or every handle is gone, then close all sessions.
    pub(crate) async fn run(mut self) -> Result<()> {
        info!("Control loop started");
        loop {
            tokio::select! {
                // Use biased to ensure branch order
                biased;
                // P0: shutdown received, or the notifier handle is gone
                _ = self.shutdown_signal.changed() => {
                    warn!("Shutdown signal received");
                    break;
                }
                // P1: admin realm changed
                _ = self.admin_signal.notified() => {
                    if let Err(e) = blocking(|| self.watcher.on_admin_change()) {
                        error!("on_admin_change: {:?}", e);
                        self.target.discovery_failed(&e);
                    }
                }
                // P2: control requests
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            debug!("Request channel closed");
                            break;
                        }
                    }
                }
            }
        }

        blocking(|| self.watcher.teardown());
        info!("Control loop stopped");
        Ok(())
    }

    pub(crate) fn handle_event(
        &mut self,
        event: ControlEvent,
    ) {
        let name = event.name();
        debug!(event = name, "Handling control event");
        match event {
            ControlEvent::Start(tx) => {
                let admin_signal = self.admin_signal.clone();
                let result = blocking(|| self.watcher.start(&admin_signal));
                reply(name, tx, result);
            }
            ControlEvent::RefreshAdmin(tx) => {
                let result = if self.watcher.is_started() {
                    blocking(|| self.watcher.on_admin_change())
                } else {
                    Err(Error::NotStarted)
                };
                reply(name, tx, result);
            }
            ControlEvent::GetVirtualPath(listen_ident, tx) => {
                reply(name, tx, self.watcher.get_virtual_path(listen_ident));
            }
            ControlEvent::GetSnapshot(listen_ident, tx) => {
                reply(name, tx, blocking(|| self.watcher.get_snapshot(listen_ident)));
            }
            ControlEvent::ListenIdents(tx) => {
                reply(name, tx, Ok(self.watcher.listen_idents()));
            }
        }
    }
}

/// Session opens, snapshot reads and worker joins block. On a multi-threaded runtime
/// they run through `block_in_place` so the worker's other tasks move elsewhere.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => task::block_in_place(f),
        _ => f(),
    }
}

fn reply<T>(
    name: &'static str,
    tx: Responder<T>,
    result: Result<T>,
) {
    if tx.send(result).is_err() {
        debug!(event = name, "Requester went away before the reply");
    }
}
