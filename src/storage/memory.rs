//! In-memory realm storage
//!
//! Every local path maps to a versioned, copy-on-write [`Group`]. Writers commit a new
//! version through [`MemoryEngine::write`]; subscribers are told `(old, new)` for each
//! commit. Snapshots pin an immutable version, so a diff between two of them never
//! observes a concurrent writer.

use std::any::Any;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::ChangeMap;
use super::ChangeSet;
use super::DiffEngine;
use super::Snapshot;
use super::StorageEngine;
use super::TableView;
use super::VersionId;
use crate::constants::OBJECT_TABLE_PREFIX;
use crate::Result;
use crate::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    String(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[derive(Debug, Clone)]
struct Row {
    /// Persistent identity, survives moves
    key: u64,
    values: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
    next_key: u64,
}

impl Table {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the index of the column, adding it when missing
    pub fn add_column(
        &mut self,
        name: &str,
    ) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        self.columns.len() - 1
    }

    pub fn column_index(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append `n` null rows, returning their positions
    pub fn add_empty_rows(
        &mut self,
        n: usize,
    ) -> Range<usize> {
        let start = self.rows.len();
        for _ in 0..n {
            let key = self.next_key;
            self.next_key += 1;
            self.rows.push(Row {
                key,
                values: Vec::new(),
            });
        }
        start..self.rows.len()
    }

    pub fn get(
        &self,
        column: usize,
        row: usize,
    ) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.values.get(column))
    }

    pub fn set(
        &mut self,
        column: usize,
        row: usize,
        value: impl Into<Value>,
    ) -> Result<()> {
        if column >= self.columns.len() {
            return Err(StorageError::ColumnNotFound {
                table: self.name.clone(),
                column: column.to_string(),
            }
            .into());
        }
        let len = self.rows.len();
        let r = self.rows.get_mut(row).ok_or_else(|| StorageError::OutOfBounds {
            table: self.name.clone(),
            row,
            len,
        })?;
        if r.values.len() <= column {
            r.values.resize(column + 1, Value::Null);
        }
        r.values[column] = value.into();
        Ok(())
    }

    /// Swap-and-truncate removal: the last row takes the place of `row`
    pub fn move_last_over(
        &mut self,
        row: usize,
    ) -> Result<()> {
        if row >= self.rows.len() {
            return Err(StorageError::OutOfBounds {
                table: self.name.clone(),
                row,
                len: self.rows.len(),
            }
            .into());
        }
        self.rows.swap_remove(row);
        Ok(())
    }
}

/// All tables of one realm version.
#[derive(Debug, Clone, Default)]
pub struct Group {
    tables: BTreeMap<String, Table>,
}

impl Group {
    /// No schema yet
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(
        &self,
        name: &str,
    ) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn add_table(
        &mut self,
        name: &str,
    ) -> &mut Table {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(name))
    }

    pub fn object_table(
        &self,
        object_type: &str,
    ) -> Option<&Table> {
        self.table(&object_table_name(object_type))
    }

    pub fn object_table_mut(
        &mut self,
        object_type: &str,
    ) -> Option<&mut Table> {
        self.table_mut(&object_table_name(object_type))
    }

    /// Create the table backing `object_type` if needed and make sure every column exists
    pub fn add_object_table(
        &mut self,
        object_type: &str,
        columns: &[&str],
    ) -> &mut Table {
        let table = self.add_table(&object_table_name(object_type));
        for column in columns {
            table.add_column(column);
        }
        table
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

fn object_table_name(object_type: &str) -> String {
    format!("{}{}", OBJECT_TABLE_PREFIX, object_type)
}

#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    path: PathBuf,
    version: VersionId,
    group: Arc<Group>,
}

impl MemorySnapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn group(&self) -> &Group {
        &self.group
    }
}

impl Snapshot for MemorySnapshot {
    fn version(&self) -> VersionId {
        self.version
    }

    fn schema_is_empty(&self) -> bool {
        self.group.is_empty()
    }

    fn resolve_table(
        &self,
        object_type: &str,
    ) -> Option<Box<dyn TableView + '_>> {
        self.group
            .object_table(object_type)
            .map(|table| Box::new(MemoryTableView { table }) as Box<dyn TableView + '_>)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MemoryTableView<'a> {
    table: &'a Table,
}

impl TableView for MemoryTableView<'_> {
    fn column_index(
        &self,
        column: &str,
    ) -> Option<usize> {
        self.table.column_index(column)
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    fn get_string(
        &self,
        column: usize,
        row: usize,
    ) -> Option<String> {
        match self.table.get(column, row) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Commit notification delivered to subscribers of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitEvent {
    pub old_version: VersionId,
    pub new_version: VersionId,
}

/// Receiving end of [`MemoryEngine::subscribe`]
pub struct Subscription {
    pub id: u64,
    pub receiver: Receiver<CommitEvent>,
}

#[derive(Default)]
struct RealmFile {
    version: VersionId,
    group: Arc<Group>,
    subscribers: Vec<(u64, Sender<CommitEvent>)>,
}

#[derive(Default)]
struct MemoryEngineInner {
    files: Mutex<HashMap<PathBuf, RealmFile>>,
    next_subscriber_id: AtomicU64,
}

/// Shared, cloneable handle to the in-memory realm files
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<MemoryEngineInner>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("files", &self.inner.files.lock().len())
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a private copy of the latest version and commit it.
    ///
    /// Nothing is committed if `f` fails. Returns the new version.
    pub fn write<F>(
        &self,
        path: impl AsRef<Path>,
        f: F,
    ) -> Result<VersionId>
    where
        F: FnOnce(&mut Group) -> Result<()>,
    {
        let path = path.as_ref();
        let mut files = self.inner.files.lock();
        let file = files.entry(path.to_path_buf()).or_default();

        let mut group = (*file.group).clone();
        f(&mut group)?;

        let old_version = file.version;
        let new_version = old_version + 1;
        file.version = new_version;
        file.group = Arc::new(group);

        let event = CommitEvent {
            old_version,
            new_version,
        };
        file.subscribers.retain(|(_, sender)| sender.send(event).is_ok());

        debug!(
            path = %path.display(),
            old_version,
            new_version,
            subscribers = file.subscribers.len(),
            "Committed realm version"
        );
        Ok(new_version)
    }

    /// Latest committed version, 0 if the file was never written
    pub fn version(
        &self,
        path: impl AsRef<Path>,
    ) -> VersionId {
        self.inner
            .files
            .lock()
            .get(path.as_ref())
            .map(|f| f.version)
            .unwrap_or(0)
    }

    pub fn subscribe(
        &self,
        path: impl AsRef<Path>,
    ) -> Subscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded();
        self.inner
            .files
            .lock()
            .entry(path.as_ref().to_path_buf())
            .or_default()
            .subscribers
            .push((id, sender));
        trace!(subscriber_id = id, path = %path.as_ref().display(), "Subscribed to commits");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(
        &self,
        path: impl AsRef<Path>,
        id: u64,
    ) {
        if let Some(file) = self.inner.files.lock().get_mut(path.as_ref()) {
            file.subscribers.retain(|(sid, _)| *sid != id);
        }
    }

    pub fn snapshot(
        &self,
        path: impl AsRef<Path>,
    ) -> MemorySnapshot {
        let path = path.as_ref();
        let files = self.inner.files.lock();
        match files.get(path) {
            Some(file) => MemorySnapshot {
                path: path.to_path_buf(),
                version: file.version,
                group: file.group.clone(),
            },
            None => MemorySnapshot {
                path: path.to_path_buf(),
                version: 0,
                group: Arc::new(Group::default()),
            },
        }
    }
}

impl StorageEngine for MemoryEngine {
    fn open_snapshot(
        &self,
        path: &Path,
    ) -> Result<Arc<dyn Snapshot>> {
        Ok(Arc::new(self.snapshot(path)))
    }
}

impl DiffEngine for MemoryEngine {
    fn diff(
        &self,
        old: &dyn Snapshot,
        new: &dyn Snapshot,
    ) -> Result<ChangeMap> {
        let old = downcast(old)?;
        let new = downcast(new)?;
        if old.path != new.path {
            return Err(StorageError::IncompatibleSnapshot(format!(
                "{} vs {}",
                old.path.display(),
                new.path.display()
            ))
            .into());
        }
        Ok(diff_groups(&old.group, &new.group))
    }
}

fn downcast(snapshot: &dyn Snapshot) -> Result<&MemorySnapshot> {
    snapshot.as_any().downcast_ref::<MemorySnapshot>().ok_or_else(|| {
        StorageError::IncompatibleSnapshot(format!(
            "{:?} was not produced by the memory engine",
            snapshot
        ))
        .into()
    })
}

/// Only object tables are reported, keyed by object type
pub(crate) fn diff_groups(
    old: &Group,
    new: &Group,
) -> ChangeMap {
    let names: BTreeSet<&str> = old.table_names().chain(new.table_names()).collect();

    let mut changes = ChangeMap::new();
    for name in names {
        let Some(object_type) = name.strip_prefix(OBJECT_TABLE_PREFIX) else {
            continue;
        };
        let set = diff_table(old.table(name), new.table(name));
        if !set.is_empty() {
            changes.insert(object_type.to_string(), set);
        }
    }
    changes
}

/// Rows are matched by persistent key. A row found at another position is reported
/// as a deletion at its old position plus an insertion at its new one.
fn diff_table(
    old: Option<&Table>,
    new: Option<&Table>,
) -> ChangeSet {
    let old_rows = old.map(|t| t.rows.as_slice()).unwrap_or(&[]);
    let new_rows = new.map(|t| t.rows.as_slice()).unwrap_or(&[]);

    let old_positions: HashMap<u64, usize> =
        old_rows.iter().enumerate().map(|(i, r)| (r.key, i)).collect();
    let new_keys: HashSet<u64> = new_rows.iter().map(|r| r.key).collect();

    let mut set = ChangeSet::default();
    for (i, row) in old_rows.iter().enumerate() {
        if !new_keys.contains(&row.key) {
            set.deletions.insert(i);
        }
    }
    for (j, row) in new_rows.iter().enumerate() {
        match old_positions.get(&row.key) {
            None => {
                set.insertions.insert(j);
            }
            Some(&i) if i != j => {
                set.deletions.insert(i);
                set.insertions.insert(j);
            }
            Some(&i) => {
                if !same_values(&old_rows[i].values, &row.values) {
                    set.modifications.insert(i);
                    set.modifications_new.insert(j);
                }
            }
        }
    }
    set
}

fn same_values(
    a: &[Value],
    b: &[Value],
) -> bool {
    let width = a.len().max(b.len());
    (0..width).all(|c| a.get(c).unwrap_or(&Value::Null) == b.get(c).unwrap_or(&Value::Null))
}
