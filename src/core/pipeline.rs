//! Per-realm notification pipeline.
//!
//! Every tracked realm owns one [`Slot`] behind its own mutex. Commit callbacks from
//! session workers lock only the slot of their realm, so a slow realm never holds back
//! delivery for the others, and notifications of one realm are handed to the target in
//! commit order.
//!
//! While paused, a slot keeps only the newest committed snapshot. `resume` computes a
//! single diff from the last delivered snapshot to that one, so any number of commits
//! made during the pause collapse into one notification.

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::notifier::ChangeNotification;
use crate::notifier::NotifierTarget;
use crate::storage::ChangeMap;
use crate::storage::DiffEngine;
use crate::storage::Snapshot;
use crate::storage::StorageEngine;
use crate::storage::VersionId;
use crate::Error;
use crate::ListenIdent;

#[derive(Debug)]
struct Slot {
    virtual_path: String,
    local_path: PathBuf,
    /// Commits are ignored until the realm has been announced to the target
    active: bool,
    last_delivered: Option<Arc<dyn Snapshot>>,
    /// Newest snapshot held back by `pause`
    pending: Option<Arc<dyn Snapshot>>,
}

impl Slot {
    fn last_delivered_version(&self) -> Option<VersionId> {
        self.last_delivered.as_ref().map(|s| s.version())
    }
}

pub(crate) struct NotificationPipeline {
    storage: Arc<dyn StorageEngine>,
    diff: Arc<dyn DiffEngine>,
    target: Arc<dyn NotifierTarget>,
    slots: DashMap<ListenIdent, Arc<Mutex<Slot>>>,
    paused: AtomicBool,
    /// Number of slots holding a pending snapshot
    pending: AtomicUsize,
}

impl std::fmt::Debug for NotificationPipeline {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("NotificationPipeline")
            .field("slots", &self.slots.len())
            .field("paused", &self.is_paused())
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .finish()
    }
}

impl NotificationPipeline {
    pub(crate) fn new(
        storage: Arc<dyn StorageEngine>,
        diff: Arc<dyn DiffEngine>,
        target: Arc<dyn NotifierTarget>,
    ) -> Self {
        Self {
            storage,
            diff,
            target,
            slots: DashMap::new(),
            paused: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
        }
    }

    /// Create an inactive slot. Must happen before the realm's session is opened.
    pub(crate) fn register(
        &self,
        listen_ident: ListenIdent,
        virtual_path: &str,
        local_path: &Path,
    ) {
        let slot = Slot {
            virtual_path: virtual_path.to_string(),
            local_path: local_path.to_path_buf(),
            active: false,
            last_delivered: None,
            pending: None,
        };
        self.slots.insert(listen_ident, Arc::new(Mutex::new(slot)));
        trace!(listen_ident, virtual_path, "Slot registered");
    }

    /// Drop the slot of a realm whose session could not be opened
    pub(crate) fn unregister(
        &self,
        listen_ident: ListenIdent,
    ) {
        if let Some((_, slot)) = self.slots.remove(&listen_ident) {
            if slot.lock().pending.take().is_some() {
                self.pending.fetch_sub(1, Ordering::SeqCst);
            }
            trace!(listen_ident, "Slot unregistered");
        }
    }

    /// Start delivering for `listen_ident` and catch up with whatever synced so far
    pub(crate) fn activate(
        &self,
        listen_ident: ListenIdent,
    ) {
        if let Some(slot) = self.slot(listen_ident) {
            slot.lock().active = true;
            self.refresh(listen_ident);
        }
    }

    /// Commit callback, runs on the realm's session worker
    pub(crate) fn on_commit(
        &self,
        listen_ident: ListenIdent,
        old_version: VersionId,
        new_version: VersionId,
    ) {
        trace!(listen_ident, old_version, new_version, "Realm committed");
        self.refresh(listen_ident);
    }

    /// Bring one slot up to the latest committed version of its replica.
    ///
    /// Delivers immediately unless paused, in which case the snapshot replaces the
    /// pending one.
    pub(crate) fn refresh(
        &self,
        listen_ident: ListenIdent,
    ) {
        let Some(slot) = self.slot(listen_ident) else {
            debug!(listen_ident, "Commit for unknown slot ignored");
            return;
        };
        let mut slot = slot.lock();
        if !slot.active {
            return;
        }

        let latest = match self.storage.open_snapshot(&slot.local_path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(listen_ident, error = %e, "Failed to open realm snapshot");
                self.target.notification_failed(listen_ident, &e);
                return;
            }
        };

        // Nothing synced down yet
        if latest.schema_is_empty() {
            return;
        }
        if slot.last_delivered_version() == Some(latest.version()) {
            return;
        }

        if self.is_paused() {
            trace!(listen_ident, version = latest.version(), "Paused, holding snapshot");
            if slot.pending.replace(latest).is_none() {
                self.pending.fetch_add(1, Ordering::SeqCst);
            }
            return;
        }

        if slot.pending.take().is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        self.deliver(listen_ident, &mut slot, latest);
    }

    pub(crate) fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            debug!("Notifications paused");
        }
    }

    /// Deliver every pending notification, in listener order, before returning.
    ///
    /// Must not be called from inside `realm_changed`.
    pub(crate) fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            debug!("Notifications resumed");
        }

        let mut slots: Vec<(ListenIdent, Arc<Mutex<Slot>>)> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        slots.sort_unstable_by_key(|(listen_ident, _)| *listen_ident);

        for (listen_ident, slot) in slots {
            if self.is_paused() {
                debug!("Paused again while resuming");
                break;
            }
            let mut slot = slot.lock();
            if let Some(snapshot) = slot.pending.take() {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                self.deliver(listen_ident, &mut slot, snapshot);
            }
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn slot(
        &self,
        listen_ident: ListenIdent,
    ) -> Option<Arc<Mutex<Slot>>> {
        // Clone out so the map shard is not held while the slot is locked
        self.slots.get(&listen_ident).map(|entry| entry.value().clone())
    }

    /// Called with the slot locked. On diff failure the slot keeps its last delivered
    /// snapshot, so the next delivery covers the failed range too.
    fn deliver(
        &self,
        listen_ident: ListenIdent,
        slot: &mut Slot,
        new_snapshot: Arc<dyn Snapshot>,
    ) {
        let changes = match &slot.last_delivered {
            None => ChangeMap::new(),
            Some(old_snapshot) => match self.diff.diff(old_snapshot.as_ref(), new_snapshot.as_ref()) {
                Ok(changes) => changes,
                Err(e) => {
                    let e = Error::DiffComputation {
                        listen_ident,
                        reason: e.to_string(),
                    };
                    warn!(listen_ident, error = %e, "Dropping notification");
                    self.target.notification_failed(listen_ident, &e);
                    return;
                }
            },
        };

        debug!(
            listen_ident,
            old_version = ?slot.last_delivered_version(),
            new_version = new_snapshot.version(),
            tables = changes.len(),
            "Delivering change notification"
        );

        let old_snapshot = slot.last_delivered.replace(new_snapshot.clone());
        self.target.realm_changed(ChangeNotification {
            listen_ident,
            virtual_path: slot.virtual_path.clone(),
            old_snapshot,
            new_snapshot,
            changes,
        });
    }
}
