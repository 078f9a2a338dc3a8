//! Realm discovery through the admin realm.
//!
//! The admin realm holds one `RealmFile` object per server-side realm. Every time it
//! changes, [`AdminWatcher::on_admin_change`] walks the records, asks the target about
//! each id it has not seen before and opens a session for the accepted ones.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ListenEntry;
use super::NotificationPipeline;
use super::SessionRegistry;
use crate::notifier::NotifierTarget;
use crate::session::CommitCallback;
use crate::session::Session;
use crate::session::SessionConfig;
use crate::session::SessionFactory;
use crate::storage::Snapshot;
use crate::storage::StorageEngine;
use crate::utils::RealmPaths;
use crate::Error;
use crate::ListenIdent;
use crate::Result;
use crate::ADMIN_ID_COLUMN;
use crate::ADMIN_OBJECT_TYPE;
use crate::ADMIN_PATH_COLUMN;

/// Owns every piece of discovery state. Only the control loop touches it.
pub(crate) struct AdminWatcher {
    paths: RealmPaths,
    access_token: String,
    storage: Arc<dyn StorageEngine>,
    sessions: Arc<dyn SessionFactory>,
    pipeline: Arc<NotificationPipeline>,
    target: Arc<dyn NotifierTarget>,

    registry: SessionRegistry,
    /// Realm ids already handed to `filter`, accepted or not
    known: HashSet<String>,
    next_listen_ident: ListenIdent,
    admin_session: Option<Box<dyn Session>>,
}

impl AdminWatcher {
    pub(crate) fn new(
        paths: RealmPaths,
        access_token: String,
        storage: Arc<dyn StorageEngine>,
        sessions: Arc<dyn SessionFactory>,
        pipeline: Arc<NotificationPipeline>,
        target: Arc<dyn NotifierTarget>,
    ) -> Self {
        Self {
            paths,
            access_token,
            storage,
            sessions,
            pipeline,
            target,
            registry: SessionRegistry::new(),
            known: HashSet::new(),
            next_listen_ident: 0,
            admin_session: None,
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.admin_session.is_some()
    }

    /// Open the admin session. Every admin commit, and the start itself, wakes `admin_signal`.
    pub(crate) fn start(
        &mut self,
        admin_signal: &Arc<Notify>,
    ) -> Result<()> {
        if self.is_started() {
            debug!("Admin session already open");
            return Ok(());
        }

        let signal = admin_signal.clone();
        let on_commit: CommitCallback = Box::new(move |old_version, new_version| {
            trace!(old_version, new_version, "Admin realm committed");
            signal.notify_one();
        });
        let config = SessionConfig {
            local_path: self.paths.admin_realm_path().to_path_buf(),
            server_url: self.paths.admin_server_url()?,
            access_token: self.access_token.clone(),
        };
        info!(server_url = %config.server_url, "Opening admin session");
        self.admin_session = Some(self.sessions.open(config, on_commit)?);

        // Pick up whatever the admin replica already holds
        admin_signal.notify_one();
        Ok(())
    }

    /// Discover realms added to the admin realm since the last run.
    ///
    /// A failure to track one realm aborts the run. Realms accepted before it stay
    /// tracked; the failed id is retried on the next run.
    pub(crate) fn on_admin_change(&mut self) -> Result<()> {
        let snapshot = self.storage.open_snapshot(self.paths.admin_realm_path())?;
        if snapshot.schema_is_empty() {
            trace!("Admin realm has no schema yet");
            return Ok(());
        }

        for (realm_id, virtual_path) in read_realm_records(snapshot.as_ref())? {
            if self.known.contains(&realm_id) {
                continue;
            }
            self.known.insert(realm_id.clone());

            if !self.target.filter(&virtual_path) {
                debug!(%realm_id, %virtual_path, "Realm rejected by filter");
                continue;
            }

            if let Err(e) = self.track(&realm_id, &virtual_path) {
                warn!(%realm_id, %virtual_path, error = %e, "Failed to track realm, will retry");
                self.known.remove(&realm_id);
                return Err(e);
            }
        }
        Ok(())
    }

    fn track(
        &mut self,
        realm_id: &str,
        virtual_path: &str,
    ) -> Result<()> {
        let listen_ident = self.next_listen_ident;
        let local_path = self.paths.local_path(realm_id)?;
        let server_url = self.paths.server_url(virtual_path)?;

        // The slot must exist before the session can call back into it
        self.pipeline.register(listen_ident, virtual_path, &local_path);

        let pipeline = self.pipeline.clone();
        let on_commit: CommitCallback = Box::new(move |old_version, new_version| {
            pipeline.on_commit(listen_ident, old_version, new_version)
        });
        let config = SessionConfig {
            local_path: local_path.clone(),
            server_url,
            access_token: self.access_token.clone(),
        };
        let session = match self.sessions.open(config, on_commit) {
            Ok(session) => session,
            Err(e) => {
                self.pipeline.unregister(listen_ident);
                return Err(e);
            }
        };

        let entry = ListenEntry {
            listen_ident,
            realm_id: realm_id.to_string(),
            virtual_path: virtual_path.to_string(),
            local_path,
            session,
        };
        self.registry.insert(entry);
        self.next_listen_ident += 1;

        info!(listen_ident, %realm_id, %virtual_path, "Tracking realm");
        self.target.realm_observed(listen_ident);
        self.pipeline.activate(listen_ident);
        Ok(())
    }

    pub(crate) fn get_virtual_path(
        &self,
        listen_ident: ListenIdent,
    ) -> Result<String> {
        Ok(self.registry.get(listen_ident)?.virtual_path.clone())
    }

    /// Fresh read snapshot of the local replica, `None` while nothing has synced down
    pub(crate) fn get_snapshot(
        &self,
        listen_ident: ListenIdent,
    ) -> Result<Option<Arc<dyn Snapshot>>> {
        let entry = self.registry.get(listen_ident)?;
        let snapshot = self.storage.open_snapshot(&entry.local_path)?;
        if snapshot.schema_is_empty() {
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    pub(crate) fn listen_idents(&self) -> Vec<ListenIdent> {
        self.registry.idents()
    }

    /// Stop discovery first, then every tracked realm
    pub(crate) fn teardown(&mut self) {
        if let Some(mut admin_session) = self.admin_session.take() {
            admin_session.close();
            debug!("Admin session closed");
        }
        let tracked = self.registry.len();
        self.registry.close_all();
        info!(tracked, "Notifier sessions closed");
    }
}

/// `(id, path)` of every `RealmFile` record, in row order
fn read_realm_records(snapshot: &dyn Snapshot) -> Result<Vec<(String, String)>> {
    let table = snapshot.resolve_table(ADMIN_OBJECT_TYPE).ok_or_else(|| {
        Error::SchemaViolation(format!("object type {} not found", ADMIN_OBJECT_TYPE))
    })?;
    let id_col = table.column_index(ADMIN_ID_COLUMN).ok_or_else(|| {
        Error::SchemaViolation(format!("{}.{} not found", ADMIN_OBJECT_TYPE, ADMIN_ID_COLUMN))
    })?;
    let path_col = table.column_index(ADMIN_PATH_COLUMN).ok_or_else(|| {
        Error::SchemaViolation(format!("{}.{} not found", ADMIN_OBJECT_TYPE, ADMIN_PATH_COLUMN))
    })?;

    let mut records = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        match (table.get_string(id_col, row), table.get_string(path_col, row)) {
            (Some(realm_id), Some(virtual_path)) => records.push((realm_id, virtual_path)),
            _ => debug!(row, "Skipping incomplete realm record"),
        }
    }
    Ok(records)
}
