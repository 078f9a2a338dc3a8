// -
// Local layout

/// Admin realm replica, relative to the local root dir
pub(crate) const ADMIN_REALM_FILE: &str = "admin.realm";

/// Directory holding one replica per tracked realm, relative to the local root dir
pub(crate) const REGULAR_REALMS_DIR: &str = "realms";

pub(crate) const REALM_FILE_EXTENSION: &str = "realm";

// -
// Admin realm schema

/// Server-side virtual path of the admin realm
pub(crate) const ADMIN_VIRTUAL_PATH: &str = "/admin";

/// Object type listing every realm known to the server
pub const ADMIN_OBJECT_TYPE: &str = "RealmFile";
pub const ADMIN_ID_COLUMN: &str = "id";
pub const ADMIN_PATH_COLUMN: &str = "path";

/// Storage tables backing an object type carry this prefix
pub const OBJECT_TABLE_PREFIX: &str = "class_";
