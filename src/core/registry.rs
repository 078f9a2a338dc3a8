use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::session::Session;
use crate::Error;
use crate::ListenIdent;
use crate::Result;

/// One accepted realm. Never mutated after creation except for teardown.
pub(crate) struct ListenEntry {
    pub(crate) listen_ident: ListenIdent,
    pub(crate) realm_id: String,
    /// Server side virtual path
    pub(crate) virtual_path: String,
    pub(crate) local_path: PathBuf,
    pub(crate) session: Box<dyn Session>,
}

impl fmt::Debug for ListenEntry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ListenEntry")
            .field("listen_ident", &self.listen_ident)
            .field("realm_id", &self.realm_id)
            .field("virtual_path", &self.virtual_path)
            .field("local_path", &self.local_path)
            .finish_non_exhaustive()
    }
}

/// Listener slot -> tracked realm.
///
/// Owned by the control loop; entries are only dropped at teardown.
#[derive(Debug, Default)]
pub(crate) struct SessionRegistry {
    entries: BTreeMap<ListenIdent, ListenEntry>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Idents come from a counter that only moves forward, so `listen_ident` is new.
    pub(crate) fn insert(
        &mut self,
        entry: ListenEntry,
    ) {
        let previous = self.entries.insert(entry.listen_ident, entry);
        debug_assert!(previous.is_none());
    }

    pub(crate) fn get(
        &self,
        listen_ident: ListenIdent,
    ) -> Result<&ListenEntry> {
        self.entries
            .get(&listen_ident)
            .ok_or(Error::UnknownListener(listen_ident))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn idents(&self) -> Vec<ListenIdent> {
        self.entries.keys().copied().collect()
    }

    /// Teardown: close every session (joining its worker) in slot order.
    pub(crate) fn close_all(&mut self) {
        for (listen_ident, mut entry) in std::mem::take(&mut self.entries) {
            entry.session.close();
            debug!(listen_ident, realm_id = %entry.realm_id, "Listener closed");
        }
    }
}
