use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::error;

use crate::storage::ChangeMap;
use crate::storage::Snapshot;
use crate::Error;
use crate::ListenIdent;

/// One delivered change of a tracked realm.
#[derive(Clone)]
pub struct ChangeNotification {
    pub listen_ident: ListenIdent,
    pub virtual_path: String,
    /// `None` for the first notification after the realm was discovered
    pub old_snapshot: Option<Arc<dyn Snapshot>>,
    pub new_snapshot: Arc<dyn Snapshot>,
    /// Object type -> row changes from `old_snapshot` to `new_snapshot`
    pub changes: ChangeMap,
}

impl ChangeNotification {
    /// "Realm now available" rather than "realm changed"
    pub fn is_initial(&self) -> bool {
        self.old_snapshot.is_none()
    }
}

impl fmt::Debug for ChangeNotification {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ChangeNotification")
            .field("listen_ident", &self.listen_ident)
            .field("virtual_path", &self.virtual_path)
            .field("old_version", &self.old_snapshot.as_ref().map(|s| s.version()))
            .field("new_version", &self.new_snapshot.version())
            .field("changes", &self.changes)
            .finish()
    }
}

/// Application side of the notifier.
///
/// `filter` only ever runs on the control loop. The other hooks run either on the control
/// loop or on a session worker, and may be called concurrently for different
/// listen idents. None of them may call [`GlobalNotifier::resume`](crate::GlobalNotifier::resume).
#[cfg_attr(test, automock)]
pub trait NotifierTarget: Send + Sync + 'static {
    /// Decide once per discovered realm whether to track it
    fn filter(
        &self,
        virtual_path: &str,
    ) -> bool;

    /// A realm was accepted, possibly before any of its data has synced
    fn realm_observed(
        &self,
        _listen_ident: ListenIdent,
    ) {
    }

    fn realm_changed(
        &self,
        notification: ChangeNotification,
    );

    /// A change of `listen_ident` could not be turned into a notification
    fn notification_failed(
        &self,
        listen_ident: ListenIdent,
        error: &Error,
    ) {
        error!(listen_ident, %error, "Change notification failed");
    }

    /// Discovery triggered by an admin commit failed
    fn discovery_failed(
        &self,
        error: &Error,
    ) {
        error!(%error, "Realm discovery failed");
    }
}
