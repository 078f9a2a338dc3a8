//! Fleet-wide change notifications for replicated realms.
//!
//! A [`GlobalNotifier`] follows the admin realm of a sync server, discovers every realm
//! the server lists there, lets the application's [`NotifierTarget`] pick which ones to
//! track, keeps a replicated session open for each of them and turns their commits into
//! a stream of [`ChangeNotification`]s that can be paused and resumed.
//!
//! ```ignore
//! let notifier = NotifierBuilder::new(NotifierConfig::load(None)?, Arc::new(MyTarget))
//!     .with_memory_backend(MemoryEngine::new())
//!     .build()?;
//! notifier.start().await?;
//! ```

mod config;
mod constants;
mod core;
mod errors;
mod notifier;
pub mod session;
pub mod storage;
pub mod utils;

pub use config::*;
pub use constants::*;
pub use errors::*;
pub use notifier::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

/// Identifies one tracked realm within a notifier. Assigned in discovery order, never reused.
pub type ListenIdent = u64;
