use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use global_notifier::session::MemorySessionFactory;
use global_notifier::storage::MemoryEngine;
use global_notifier::ChangeNotification;
use global_notifier::Error;
use global_notifier::GlobalNotifier;
use global_notifier::ListenIdent;
use global_notifier::NotifierBuilder;
use global_notifier::NotifierConfig;
use global_notifier::NotifierTarget;
use global_notifier::ADMIN_ID_COLUMN;
use global_notifier::ADMIN_OBJECT_TYPE;
use global_notifier::ADMIN_PATH_COLUMN;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::time::sleep;
use tokio::time::Instant;

fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Accepts virtual paths starting with `prefix`
pub struct PrefixTarget {
    prefix: String,
    pub filtered: Mutex<Vec<String>>,
    pub observed: Mutex<Vec<ListenIdent>>,
    pub changes: Mutex<Vec<ChangeNotification>>,
    pub errors: Mutex<Vec<String>>,
}

impl PrefixTarget {
    pub fn new(prefix: &str) -> Arc<Self> {
        Arc::new(Self {
            prefix: prefix.to_string(),
            filtered: Mutex::new(Vec::new()),
            observed: Mutex::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        })
    }

    pub fn delivered(&self) -> usize {
        self.changes.lock().len()
    }

    pub fn last(&self) -> Option<ChangeNotification> {
        self.changes.lock().last().cloned()
    }

    pub fn times_filtered(
        &self,
        virtual_path: &str,
    ) -> usize {
        self.filtered.lock().iter().filter(|p| *p == virtual_path).count()
    }
}

impl NotifierTarget for PrefixTarget {
    fn filter(
        &self,
        virtual_path: &str,
    ) -> bool {
        self.filtered.lock().push(virtual_path.to_string());
        virtual_path.starts_with(&self.prefix)
    }

    fn realm_observed(
        &self,
        listen_ident: ListenIdent,
    ) {
        self.observed.lock().push(listen_ident);
    }

    fn realm_changed(
        &self,
        notification: ChangeNotification,
    ) {
        self.changes.lock().push(notification);
    }

    fn notification_failed(
        &self,
        _listen_ident: ListenIdent,
        error: &Error,
    ) {
        self.errors.lock().push(error.to_string());
    }

    fn discovery_failed(
        &self,
        error: &Error,
    ) {
        self.errors.lock().push(error.to_string());
    }
}

/// A notifier running on an in-memory server
pub struct TestServer {
    pub engine: MemoryEngine,
    pub sessions: Arc<MemorySessionFactory>,
    pub config: NotifierConfig,
    _root: TempDir,
}

impl TestServer {
    pub fn new() -> Self {
        enable_logger();
        let root = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();
        Self {
            sessions: Arc::new(MemorySessionFactory::new(engine.clone())),
            engine,
            config: NotifierConfig::new(root.path(), "realm://127.0.0.1:9080/", "token"),
            _root: root,
        }
    }

    pub async fn notifier(
        &self,
        target: Arc<PrefixTarget>,
    ) -> GlobalNotifier {
        let engine = Arc::new(self.engine.clone());
        let notifier = NotifierBuilder::new(self.config.clone(), target)
            .with_storage_engine(engine.clone())
            .with_diff_engine(engine)
            .with_session_factory(self.sessions.clone())
            .build()
            .unwrap();
        notifier.start().await.unwrap();
        notifier
    }

    pub fn realm_path(
        &self,
        realm_id: &str,
    ) -> PathBuf {
        self.config.regular_realms_dir().join(format!("{}.realm", realm_id))
    }

    /// Server creates a realm and lists it in the admin realm
    pub fn create_realm(
        &self,
        realm_id: &str,
        virtual_path: &str,
    ) {
        self.engine
            .write(self.config.admin_realm_path(), |g| {
                let table = g.add_object_table(ADMIN_OBJECT_TYPE, &[ADMIN_ID_COLUMN, ADMIN_PATH_COLUMN]);
                let row = table.add_empty_rows(1).start;
                table.set(0, row, realm_id)?;
                table.set(1, row, virtual_path)
            })
            .unwrap();
    }

    pub fn write(
        &self,
        realm_id: &str,
        f: impl FnOnce(&mut global_notifier::storage::Group) -> global_notifier::Result<()>,
    ) {
        self.engine.write(self.realm_path(realm_id), f).unwrap();
    }
}
