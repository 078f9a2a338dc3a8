//! Replicated sessions
//!
//! A session keeps one local replica in sync with one server-side realm and calls its
//! commit callback after every transaction applied on behalf of the server. The callback
//! runs on the session's own worker, so callbacks of different sessions may overlap.

mod memory;


use std::fmt;
use std::path::PathBuf;

pub use memory::*;
#[cfg(test)]
use mockall::automock;

use crate::storage::VersionId;
use crate::Result;

/// `(old_version, new_version)` of a remotely applied transaction
pub type CommitCallback = Box<dyn Fn(VersionId, VersionId) + Send + Sync + 'static>;

#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub local_path: PathBuf,
    pub server_url: String,
    pub access_token: String,
}

impl fmt::Debug for SessionConfig {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("local_path", &self.local_path)
            .field("server_url", &self.server_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

pub trait Session: Send + Sync {
    fn config(&self) -> &SessionConfig;

    /// Stop replicating and join the worker.
    ///
    /// No commit callback runs once this returns. Calling it twice is a no-op.
    fn close(&mut self);
}

#[cfg_attr(test, automock)]
pub trait SessionFactory: Send + Sync + 'static {
    /// Bind a session to `config.server_url`.
    ///
    /// Connection, auth and local I/O failures surface here as
    /// [`Error::SessionOpen`](crate::Error::SessionOpen); they are not retried.
    fn open(
        &self,
        config: SessionConfig,
        on_commit: CommitCallback,
    ) -> Result<Box<dyn Session>>;
}
