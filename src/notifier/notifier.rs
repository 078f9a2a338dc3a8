use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::info;
use tracing::warn;

use crate::core::ControlEvent;
use crate::core::NotificationPipeline;
use crate::core::Responder;
use crate::storage::Snapshot;
use crate::Error;
use crate::ListenIdent;
use crate::Result;

/// Handle to a running notifier.
///
/// Discovery and the accessors are served one at a time by the control loop.
/// Flow control (`pause`, `resume`, `has_pending`) acts on the pipeline directly and can
/// be called from any thread.
pub struct GlobalNotifier {
    event_tx: mpsc::Sender<ControlEvent>,
    pipeline: Arc<NotificationPipeline>,
    shutdown_tx: watch::Sender<()>,
    control_loop: Option<JoinHandle<Result<()>>>,
    request_timeout: Duration,
}

impl fmt::Debug for GlobalNotifier {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("GlobalNotifier")
            .field("pipeline", &self.pipeline)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl GlobalNotifier {
    pub(crate) fn new(
        event_tx: mpsc::Sender<ControlEvent>,
        pipeline: Arc<NotificationPipeline>,
        shutdown_tx: watch::Sender<()>,
        control_loop: JoinHandle<Result<()>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            event_tx,
            pipeline,
            shutdown_tx,
            control_loop: Some(control_loop),
            request_timeout,
        }
    }

    /// Open the admin session and discover the realms it already lists. Idempotent.
    pub async fn start(&self) -> Result<()> {
        self.request(ControlEvent::Start).await
    }

    /// Run discovery now. Unlike discovery triggered by admin commits, failures are
    /// returned to the caller. Fails with [`Error::NotStarted`] before [`start`](Self::start).
    pub async fn refresh(&self) -> Result<()> {
        self.request(ControlEvent::RefreshAdmin).await
    }

    pub async fn get_virtual_path(
        &self,
        listen_ident: ListenIdent,
    ) -> Result<String> {
        self.request(|tx| ControlEvent::GetVirtualPath(listen_ident, tx))
            .await
    }

    /// Latest local snapshot of a tracked realm, `None` while nothing has synced down
    pub async fn get_snapshot(
        &self,
        listen_ident: ListenIdent,
    ) -> Result<Option<Arc<dyn Snapshot>>> {
        self.request(|tx| ControlEvent::GetSnapshot(listen_ident, tx))
            .await
    }

    /// Tracked listen idents, ascending
    pub async fn listen_idents(&self) -> Result<Vec<ListenIdent>> {
        self.request(ControlEvent::ListenIdents).await
    }

    /// Hold back notifications until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.pipeline.pause();
    }

    /// Deliver everything held back, one notification per realm, before returning.
    ///
    /// Must not be called from inside a [`NotifierTarget`](super::NotifierTarget) callback.
    pub fn resume(&self) {
        self.pipeline.resume();
    }

    pub fn has_pending(&self) -> bool {
        self.pipeline.has_pending()
    }

    pub fn is_paused(&self) -> bool {
        self.pipeline.is_paused()
    }

    /// Stop the control loop and close every session.
    ///
    /// No target callback runs after this returns, except from a concurrent `resume`.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down global notifier");
        if self.shutdown_tx.send(()).is_err() {
            warn!("Control loop already stopped");
        }
        if let Some(control_loop) = self.control_loop.take() {
            control_loop
                .await
                .map_err(|e| Error::Fatal(format!("control loop failed: {}", e)))??;
        }
        Ok(())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Responder<T>) -> ControlEvent,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.event_tx
            .send(make(tx))
            .await
            .map_err(|_| Error::ControlLoopStopped)?;

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ControlLoopStopped),
            Err(_) => Err(Error::RequestTimeout(self.request_timeout)),
        }
    }
}

impl Drop for GlobalNotifier {
    fn drop(&mut self) {
        if self.control_loop.is_some() {
            let _ = self.shutdown_tx.send(());
        }
    }
}
