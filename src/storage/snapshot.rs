use std::any::Any;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::Result;

/// Committed version of a realm file. Strictly increasing per file.
pub type VersionId = u64;

/// Read-only, point-in-time view of one realm replica.
pub trait Snapshot: Send + Sync + Debug + 'static {
    fn version(&self) -> VersionId;

    /// True until the first schema has been written (nothing synced down yet)
    fn schema_is_empty(&self) -> bool;

    /// Resolve a logical object type to its backing table
    fn resolve_table(
        &self,
        object_type: &str,
    ) -> Option<Box<dyn TableView + '_>>;

    /// Lets a diff engine recover the concrete snapshot type it produced
    fn as_any(&self) -> &dyn Any;
}

/// Row-oriented read access to one table of a [`Snapshot`].
pub trait TableView {
    fn column_index(
        &self,
        column: &str,
    ) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` if the cell is null or not a string
    fn get_string(
        &self,
        column: usize,
        row: usize,
    ) -> Option<String>;
}

pub trait StorageEngine: Send + Sync + 'static {
    /// Open a non-caching read snapshot of the latest committed version.
    ///
    /// A replica that does not exist yet reads as an empty schema.
    fn open_snapshot(
        &self,
        path: &Path,
    ) -> Result<Arc<dyn Snapshot>>;
}
