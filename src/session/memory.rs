use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::CommitCallback;
use super::Session;
use super::SessionConfig;
use super::SessionFactory;
use crate::storage::MemoryEngine;
use crate::storage::Subscription;
use crate::Error;
use crate::Result;

/// Sessions over a [`MemoryEngine`]: every commit written to the local path is treated
/// as a transaction applied by the sync client.
pub struct MemorySessionFactory {
    engine: MemoryEngine,
    rejected_urls: Mutex<HashSet<String>>,
    live_sessions: Arc<AtomicUsize>,
}

impl MemorySessionFactory {
    pub fn new(engine: MemoryEngine) -> Self {
        Self {
            engine,
            rejected_urls: Mutex::new(HashSet::new()),
            live_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every later `open` for `server_url` fail, as an unreachable server would
    pub fn reject(
        &self,
        server_url: impl Into<String>,
    ) {
        self.rejected_urls.lock().insert(server_url.into());
    }

    pub fn accept(
        &self,
        server_url: &str,
    ) {
        self.rejected_urls.lock().remove(server_url);
    }

    /// Sessions opened and not yet closed
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }
}

impl SessionFactory for MemorySessionFactory {
    fn open(
        &self,
        config: SessionConfig,
        on_commit: CommitCallback,
    ) -> Result<Box<dyn Session>> {
        if self.rejected_urls.lock().contains(&config.server_url) {
            return Err(Error::SessionOpen {
                server_url: config.server_url,
                reason: "connection refused".to_string(),
            });
        }

        let Subscription { id, receiver } = self.engine.subscribe(&config.local_path);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let worker_name = format!(
            "session-{}",
            config
                .local_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        let spawned = thread::Builder::new().name(worker_name).spawn(move || {
            debug!("Session worker started");
            loop {
                crossbeam_channel::select! {
                    recv(receiver) -> result => {
                        match result {
                            Ok(event) => {
                                trace!(
                                    old_version = event.old_version,
                                    new_version = event.new_version,
                                    "Applied remote transaction"
                                );
                                on_commit(event.old_version, event.new_version);
                            }
                            // Unsubscribed
                            Err(_) => break,
                        }
                    }
                    recv(shutdown_rx) -> _ => break,
                }
            }
            debug!("Session worker stopped");
        });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.engine.unsubscribe(&config.local_path, id);
                return Err(Error::SessionOpen {
                    server_url: config.server_url,
                    reason: e.to_string(),
                });
            }
        };

        self.live_sessions.fetch_add(1, Ordering::SeqCst);
        debug!(?config, "Session opened");

        Ok(Box::new(MemorySession {
            config,
            engine: self.engine.clone(),
            subscription_id: id,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
            live_sessions: self.live_sessions.clone(),
        }))
    }
}

pub struct MemorySession {
    config: SessionConfig,
    engine: MemoryEngine,
    subscription_id: u64,
    shutdown_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    live_sessions: Arc<AtomicUsize>,
}

impl Session for MemorySession {
    fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn close(&mut self) {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return;
        };
        self.engine.unsubscribe(&self.config.local_path, self.subscription_id);
        let _ = shutdown_tx.send(());

        if let Some(worker) = self.worker.take() {
            // A callback that drops its own session cannot wait for itself
            if worker.thread().id() == thread::current().id() {
                warn!(server_url = %self.config.server_url, "Session closed from its own worker");
            } else if worker.join().is_err() {
                warn!(server_url = %self.config.server_url, "Session worker panicked");
            }
        }

        self.live_sessions.fetch_sub(1, Ordering::SeqCst);
        debug!(server_url = %self.config.server_url, "Session closed");
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}
