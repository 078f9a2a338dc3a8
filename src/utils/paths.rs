use std::path::Path;
use std::path::PathBuf;

use url::Url;

use crate::constants::ADMIN_VIRTUAL_PATH;
use crate::constants::REALM_FILE_EXTENSION;
use crate::Error;
use crate::NotifierConfig;
use crate::Result;

/// Local replica locations and server URLs, derived once from the config. Thread-safe.
#[derive(Debug, Clone)]
pub struct RealmPaths {
    admin_realm_path: PathBuf,
    regular_realms_dir: PathBuf,
    server_base_url: Url,
}

impl RealmPaths {
    pub fn new(config: &NotifierConfig) -> Result<Self> {
        let server_base_url = Url::parse(&config.server_base_url)?;
        if server_base_url.cannot_be_a_base() {
            return Err(Error::InvalidUri(config.server_base_url.clone()));
        }
        Ok(Self {
            admin_realm_path: config.admin_realm_path(),
            regular_realms_dir: config.regular_realms_dir(),
            server_base_url,
        })
    }

    pub fn admin_realm_path(&self) -> &Path {
        &self.admin_realm_path
    }

    pub fn regular_realms_dir(&self) -> &Path {
        &self.regular_realms_dir
    }

    pub fn admin_server_url(&self) -> Result<String> {
        self.server_url(ADMIN_VIRTUAL_PATH)
    }

    /// `<root>/realms/<realm_id>.realm`
    pub fn local_path(
        &self,
        realm_id: &str,
    ) -> Result<PathBuf> {
        if realm_id.is_empty()
            || realm_id == "."
            || realm_id == ".."
            || realm_id.contains(['/', '\\'])
        {
            return Err(Error::InvalidRealmId(realm_id.to_string()));
        }
        Ok(self
            .regular_realms_dir
            .join(format!("{}.{}", realm_id, REALM_FILE_EXTENSION)))
    }

    /// `virtual_path` resolved against the base URL, query and fragment dropped
    pub fn server_url(
        &self,
        virtual_path: &str,
    ) -> Result<String> {
        let mut url = self.server_base_url.join(virtual_path)?;
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.into())
    }
}
