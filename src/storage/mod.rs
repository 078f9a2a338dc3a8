//! Storage collaborators
//!
//! The notifier never writes realm data. It needs three things from the storage layer:
//! - point-in-time read snapshots of a local replica ([`StorageEngine`], [`Snapshot`])
//! - object-type to table resolution for the admin realm ([`TableView`])
//! - a persistent-identity diff between two snapshots ([`DiffEngine`])
//!
//! [`MemoryEngine`] is an in-process reference implementation of all three.

mod diff;
mod memory;
mod snapshot;


pub use diff::*;
pub use memory::*;
pub use snapshot::*;
