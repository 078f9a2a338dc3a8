use std::collections::BTreeMap;
use std::collections::BTreeSet;

use super::Snapshot;
use crate::Result;

/// Ordered set of row positions
pub type IndexSet = BTreeSet<usize>;

/// Row-level changes of one table between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Positions in the new snapshot
    pub insertions: IndexSet,
    /// Positions in the old snapshot
    pub deletions: IndexSet,
    /// Positions in the old snapshot
    pub modifications: IndexSet,
    /// Positions in the new snapshot, i.e. after deletions are applied
    pub modifications_new: IndexSet,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
            && self.deletions.is_empty()
            && self.modifications.is_empty()
            && self.modifications_new.is_empty()
    }
}

/// Object type name -> changes. Tables without changes are absent.
pub type ChangeMap = BTreeMap<String, ChangeSet>;

pub trait DiffEngine: Send + Sync + 'static {
    fn diff(
        &self,
        old: &dyn Snapshot,
        new: &dyn Snapshot,
    ) -> Result<ChangeMap>;
}
