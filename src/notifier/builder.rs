//! A builder for [`GlobalNotifier`].
//!
//! [`NotifierBuilder`] gathers the collaborators a notifier needs: a storage engine
//! to read local replicas, a diff engine to compare snapshots and a session factory to
//! keep replicas in sync. `build()` wires them to the pipeline and the admin watcher,
//! then spawns the control loop on the current tokio runtime.
//!
//! ## Example
//! ```ignore
//! let engine = MemoryEngine::new();
//! let notifier = NotifierBuilder::new(config, Arc::new(MyTarget))
//!     .with_memory_backend(engine)
//!     .build()?;
//! notifier.start().await?;
//! ```

use std::fs;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use super::GlobalNotifier;
use super::NotifierTarget;
use crate::core::AdminWatcher;
use crate::core::ControlLoop;
use crate::core::NotificationPipeline;
use crate::session::MemorySessionFactory;
use crate::session::SessionFactory;
use crate::storage::DiffEngine;
use crate::storage::MemoryEngine;
use crate::storage::StorageEngine;
use crate::utils::RealmPaths;
use crate::Error;
use crate::NotifierConfig;
use crate::Result;
use crate::StorageError;

pub struct NotifierBuilder {
    config: NotifierConfig,
    target: Arc<dyn NotifierTarget>,
    storage: Option<Arc<dyn StorageEngine>>,
    diff: Option<Arc<dyn DiffEngine>>,
    sessions: Option<Arc<dyn SessionFactory>>,
}

impl NotifierBuilder {
    pub fn new(
        config: NotifierConfig,
        target: Arc<dyn NotifierTarget>,
    ) -> Self {
        Self {
            config,
            target,
            storage: None,
            diff: None,
            sessions: None,
        }
    }

    pub fn with_storage_engine(
        mut self,
        storage: Arc<dyn StorageEngine>,
    ) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_diff_engine(
        mut self,
        diff: Arc<dyn DiffEngine>,
    ) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn with_session_factory(
        mut self,
        sessions: Arc<dyn SessionFactory>,
    ) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Use `engine` for storage, diffs and sessions
    pub fn with_memory_backend(
        self,
        engine: MemoryEngine,
    ) -> Self {
        let sessions = Arc::new(MemorySessionFactory::new(engine.clone()));
        let engine = Arc::new(engine);
        self.with_storage_engine(engine.clone())
            .with_diff_engine(engine)
            .with_session_factory(sessions)
    }

    /// Validate the config, create `<root>/realms` and spawn the control loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<GlobalNotifier> {
        self.config.validate()?;
        let paths = RealmPaths::new(&self.config)?;

        let storage = self
            .storage
            .ok_or_else(|| Error::InvalidConfig("no storage engine configured".to_string()))?;
        let diff = self
            .diff
            .ok_or_else(|| Error::InvalidConfig("no diff engine configured".to_string()))?;
        let sessions = self
            .sessions
            .ok_or_else(|| Error::InvalidConfig("no session factory configured".to_string()))?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::Fatal(format!("notifier must be built inside a tokio runtime: {}", e)))?;

        let realms_dir = paths.regular_realms_dir().to_path_buf();
        fs::create_dir_all(&realms_dir).map_err(|e| StorageError::PathError {
            path: realms_dir.clone(),
            source: e,
        })?;
        debug!(realms_dir = %realms_dir.display(), "Local realm directory ready");

        let pipeline = Arc::new(NotificationPipeline::new(storage.clone(), diff, self.target.clone()));
        let watcher = AdminWatcher::new(
            paths,
            self.config.access_token.clone(),
            storage,
            sessions,
            pipeline.clone(),
            self.target.clone(),
        );

        let control = &self.config.control;
        let (event_tx, event_rx) = mpsc::channel(control.request_channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let control_loop = ControlLoop::new(watcher, self.target, event_rx, shutdown_rx);
        let handle = runtime.spawn(control_loop.run());

        info!(
            local_root_dir = %self.config.local_root_dir.display(),
            server_base_url = %self.config.server_base_url,
            "Global notifier built"
        );
        Ok(GlobalNotifier::new(
            event_tx,
            pipeline,
            shutdown_tx,
            handle,
            control.request_timeout(),
        ))
    }
}
