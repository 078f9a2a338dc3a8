use std::sync::Arc;

use tokio::sync::oneshot;

use crate::storage::Snapshot;
use crate::ListenIdent;
use crate::Result;

/// Reply half of a control request
pub(crate) type Responder<T> = oneshot::Sender<Result<T>>;

/// Requests served on the control loop, one at a time.
#[derive(Debug)]
pub(crate) enum ControlEvent {
    Start(Responder<()>),

    /// Run discovery now and report its outcome to the caller
    RefreshAdmin(Responder<()>),

    GetVirtualPath(ListenIdent, Responder<String>),

    GetSnapshot(ListenIdent, Responder<Option<Arc<dyn Snapshot>>>),

    ListenIdents(Responder<Vec<ListenIdent>>),
}

impl ControlEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            ControlEvent::Start(_) => "start",
            ControlEvent::RefreshAdmin(_) => "refresh_admin",
            ControlEvent::GetVirtualPath(_, _) => "get_virtual_path",
            ControlEvent::GetSnapshot(_, _) => "get_snapshot",
            ControlEvent::ListenIdents(_) => "listen_idents",
        }
    }
}
