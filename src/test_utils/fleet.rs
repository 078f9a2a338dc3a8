use std::path::PathBuf;

use tempfile::TempDir;

use crate::storage::Group;
use crate::storage::MemoryEngine;
use crate::storage::VersionId;
use crate::NotifierConfig;
use crate::Result;
use crate::ADMIN_ID_COLUMN;
use crate::ADMIN_OBJECT_TYPE;
use crate::ADMIN_PATH_COLUMN;

pub const TEST_BASE_URL: &str = "realm://localhost:9080";

/// Server-side view of a fleet: the admin realm plus one replica per realm id, all
/// held in one [`MemoryEngine`] under a temporary root.
pub struct Fleet {
    pub engine: MemoryEngine,
    pub config: NotifierConfig,
    _root: TempDir,
}

impl Fleet {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp root");
        Self {
            engine: MemoryEngine::new(),
            config: NotifierConfig::new(root.path(), TEST_BASE_URL, "admin-token"),
            _root: root,
        }
    }

    pub fn admin_path(&self) -> PathBuf {
        self.config.admin_realm_path()
    }

    pub fn realm_path(
        &self,
        realm_id: &str,
    ) -> PathBuf {
        self.config
            .regular_realms_dir()
            .join(format!("{}.realm", realm_id))
    }

    /// Publish one realm record in the admin realm
    pub fn add_realm(
        &self,
        realm_id: &str,
        virtual_path: &str,
    ) -> VersionId {
        self.add_realms(&[(realm_id, virtual_path)])
    }

    /// Publish several realm records in a single admin transaction
    pub fn add_realms(
        &self,
        records: &[(&str, &str)],
    ) -> VersionId {
        self.engine
            .write(self.admin_path(), |g| {
                let table = g.add_object_table(ADMIN_OBJECT_TYPE, &[ADMIN_ID_COLUMN, ADMIN_PATH_COLUMN]);
                let id_col = table.add_column(ADMIN_ID_COLUMN);
                let path_col = table.add_column(ADMIN_PATH_COLUMN);
                for (realm_id, virtual_path) in records {
                    let row = table.add_empty_rows(1).start;
                    table.set(id_col, row, *realm_id)?;
                    table.set(path_col, row, *virtual_path)?;
                }
                Ok(())
            })
            .expect("write admin realm")
    }

    /// Commit a transaction to the local replica of `realm_id`
    pub fn write(
        &self,
        realm_id: &str,
        f: impl FnOnce(&mut Group) -> Result<()>,
    ) -> VersionId {
        self.engine.write(self.realm_path(realm_id), f).expect("write realm")
    }

    /// First schema of a realm: an empty `object` table with one `value` column
    pub fn create_object_table(
        &self,
        realm_id: &str,
    ) -> VersionId {
        self.write(realm_id, |g| {
            g.add_object_table("object", &["value"]);
            Ok(())
        })
    }

    pub fn insert_rows(
        &self,
        realm_id: &str,
        object_type: &str,
        n: usize,
    ) -> VersionId {
        let object_type = object_type.to_string();
        self.write(realm_id, move |g| {
            g.add_object_table(&object_type, &["value"]).add_empty_rows(n);
            Ok(())
        })
    }

    pub fn set_value(
        &self,
        realm_id: &str,
        row: usize,
        value: i64,
    ) -> VersionId {
        self.write(realm_id, |g| {
            let table = g.add_object_table("object", &["value"]);
            let col = table.add_column("value");
            table.set(col, row, value)
        })
    }

    pub fn remove_row(
        &self,
        realm_id: &str,
        row: usize,
    ) -> VersionId {
        self.write(realm_id, |g| g.add_object_table("object", &["value"]).move_last_over(row))
    }
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new()
    }
}
