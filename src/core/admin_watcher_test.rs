use std::sync::Arc;
use std::time::Duration;

use mockall::predicate::eq;
use tokio::sync::Notify;

use super::*;
use crate::notifier::MockNotifierTarget;
use crate::notifier::NotifierTarget;
use crate::session::MemorySessionFactory;
use crate::session::MockSessionFactory;
use crate::session::Session;
use crate::session::SessionConfig;
use crate::session::SessionFactory;
use crate::test_utils::Fleet;
use crate::test_utils::RecordingTarget;
use crate::test_utils::TEST_BASE_URL;
use crate::utils::RealmPaths;
use crate::Error;
use crate::ADMIN_OBJECT_TYPE;

struct StubSession {
    config: SessionConfig,
}

impl Session for StubSession {
    fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn close(&mut self) {}
}

fn watcher(
    fleet: &Fleet,
    target: Arc<dyn NotifierTarget>,
    sessions: Arc<dyn SessionFactory>,
) -> AdminWatcher {
    let storage = Arc::new(fleet.engine.clone());
    let pipeline = Arc::new(NotificationPipeline::new(
        storage.clone(),
        Arc::new(fleet.engine.clone()),
        target.clone(),
    ));
    AdminWatcher::new(
        RealmPaths::new(&fleet.config).unwrap(),
        fleet.config.access_token.clone(),
        storage,
        sessions,
        pipeline,
        target,
    )
}

fn memory_watcher(
    fleet: &Fleet,
    target: Arc<RecordingTarget>,
) -> (AdminWatcher, Arc<MemorySessionFactory>) {
    let sessions = Arc::new(MemorySessionFactory::new(fleet.engine.clone()));
    (watcher(fleet, target, sessions.clone()), sessions)
}

#[test]
fn test_admin_realm_without_schema_is_ignored() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, _) = memory_watcher(&fleet, target.clone());

    fleet.engine.write(fleet.admin_path(), |_| Ok(())).unwrap();
    watcher.on_admin_change().unwrap();

    assert!(target.filter_calls().is_empty());
}

#[test]
fn test_missing_realm_table_is_schema_violation() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, _) = memory_watcher(&fleet, target.clone());

    fleet
        .engine
        .write(fleet.admin_path(), |g| {
            g.add_object_table("User", &["name"]);
            Ok(())
        })
        .unwrap();

    assert!(matches!(watcher.on_admin_change(), Err(Error::SchemaViolation(_))));
}

#[test]
fn test_missing_path_column_is_schema_violation() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, _) = memory_watcher(&fleet, target.clone());

    fleet
        .engine
        .write(fleet.admin_path(), |g| {
            g.add_object_table(ADMIN_OBJECT_TYPE, &["id"]);
            Ok(())
        })
        .unwrap();

    assert!(matches!(watcher.on_admin_change(), Err(Error::SchemaViolation(_))));
}

#[test]
fn test_filter_runs_once_per_realm_id() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::rejecting(&["/rejected"]));
    let (mut watcher, _) = memory_watcher(&fleet, target.clone());

    fleet.add_realms(&[("a", "/accepted"), ("b", "/rejected")]);
    watcher.on_admin_change().unwrap();
    watcher.on_admin_change().unwrap();
    fleet.add_realm("c", "/later");
    watcher.on_admin_change().unwrap();

    assert_eq!(target.filter_calls(), vec!["/accepted", "/rejected", "/later"]);
    assert_eq!(watcher.listen_idents(), vec![0, 1]);
    assert_eq!(watcher.get_virtual_path(0).unwrap(), "/accepted");
    assert_eq!(watcher.get_virtual_path(1).unwrap(), "/later");
    assert_eq!(target.observed(), vec![0, 1]);
}

#[test]
fn test_session_open_failure_is_retried_next_cycle() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, sessions) = memory_watcher(&fleet, target.clone());
    let url = format!("{}/flaky", TEST_BASE_URL);
    sessions.reject(url.as_str());

    fleet.add_realm("a", "/flaky");
    assert!(matches!(watcher.on_admin_change(), Err(Error::SessionOpen { .. })));
    assert!(watcher.listen_idents().is_empty());

    sessions.accept(&url);
    watcher.on_admin_change().unwrap();

    assert_eq!(target.filter_count("/flaky"), 2);
    // A failed open does not consume an identifier
    assert_eq!(watcher.listen_idents(), vec![0]);
}

#[test]
fn test_failure_aborts_rest_of_cycle() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, sessions) = memory_watcher(&fleet, target.clone());
    sessions.reject(format!("{}/b", TEST_BASE_URL));

    fleet.add_realms(&[("a", "/a"), ("b", "/b"), ("c", "/c")]);

    assert!(watcher.on_admin_change().is_err());
    assert_eq!(target.filter_calls(), vec!["/a", "/b"]);
    assert_eq!(watcher.listen_idents(), vec![0]);
}

#[test]
fn test_unmappable_realm_id_is_rejected_and_retried() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, sessions) = memory_watcher(&fleet, target.clone());

    fleet.add_realm("../escape", "/escape");

    assert!(matches!(watcher.on_admin_change(), Err(Error::InvalidRealmId(_))));
    assert!(matches!(watcher.on_admin_change(), Err(Error::InvalidRealmId(_))));
    assert_eq!(target.filter_count("/escape"), 2);
    assert_eq!(sessions.live_sessions(), 0);
}

#[test]
fn test_synced_data_is_announced_on_acceptance() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, _) = memory_watcher(&fleet, target.clone());

    fleet.create_object_table("a");
    fleet.insert_rows("a", "object", 3);
    fleet.add_realm("a", "/a");
    watcher.on_admin_change().unwrap();

    assert_eq!(target.observed(), vec![0]);
    let notifications = target.notifications();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].is_initial());
    assert!(notifications[0].changes.is_empty());
}

#[test]
fn test_accessors() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, _) = memory_watcher(&fleet, target.clone());

    fleet.add_realm("a", "/users/alice");
    watcher.on_admin_change().unwrap();

    assert_eq!(watcher.get_virtual_path(0).unwrap(), "/users/alice");
    assert!(watcher.get_snapshot(0).unwrap().is_none());

    let version = fleet.create_object_table("a");
    let snapshot = watcher.get_snapshot(0).unwrap().unwrap();
    assert_eq!(snapshot.version(), version);
    assert!(snapshot.resolve_table("object").is_some());

    assert!(matches!(watcher.get_virtual_path(1), Err(Error::UnknownListener(1))));
    assert!(matches!(watcher.get_snapshot(1), Err(Error::UnknownListener(1))));
}

#[test]
fn test_teardown_closes_every_session() {
    let fleet = Fleet::new();
    let target = Arc::new(RecordingTarget::new());
    let (mut watcher, sessions) = memory_watcher(&fleet, target.clone());
    let admin_signal = Arc::new(Notify::new());

    watcher.start(&admin_signal).unwrap();
    fleet.add_realms(&[("a", "/a"), ("b", "/b")]);
    watcher.on_admin_change().unwrap();
    assert_eq!(sessions.live_sessions(), 3);

    watcher.teardown();

    assert_eq!(sessions.live_sessions(), 0);
    assert!(!watcher.is_started());
}

#[test]
fn test_sessions_are_bound_to_resolved_urls() {
    let fleet = Fleet::new();
    let root = fleet.config.local_root_dir.clone();
    let mut sessions = MockSessionFactory::new();
    sessions
        .expect_open()
        .withf(move |config, _| {
            config.server_url == "realm://localhost:9080/users/alice/tasks"
                && config.local_path == root.join("realms").join("5f3a.realm")
                && config.access_token == "admin-token"
        })
        .times(1)
        .returning(|config, _| Ok(Box::new(StubSession { config }) as Box<dyn Session>));

    let mut target = MockNotifierTarget::new();
    target
        .expect_filter()
        .withf(|virtual_path| virtual_path == "/users/alice/tasks")
        .times(1)
        .return_const(true);
    target.expect_realm_observed().with(eq(0u64)).times(1).return_const(());
    target.expect_realm_changed().times(0);

    let mut watcher = watcher(&fleet, Arc::new(target), Arc::new(sessions));
    fleet.add_realm("5f3a", "/users/alice/tasks");
    watcher.on_admin_change().unwrap();
    watcher.on_admin_change().unwrap();
}

#[tokio::test]
async fn test_start_is_idempotent_and_schedules_discovery() {
    let fleet = Fleet::new();
    let mut sessions = MockSessionFactory::new();
    sessions
        .expect_open()
        .withf(|config, _| config.server_url == "realm://localhost:9080/admin")
        .times(1)
        .returning(|config, _| Ok(Box::new(StubSession { config }) as Box<dyn Session>));
    let target = Arc::new(RecordingTarget::new());
    let mut watcher = watcher(&fleet, target, Arc::new(sessions));
    let admin_signal = Arc::new(Notify::new());

    watcher.start(&admin_signal).unwrap();
    watcher.start(&admin_signal).unwrap();

    assert!(watcher.is_started());
    tokio::time::timeout(Duration::from_secs(1), admin_signal.notified())
        .await
        .expect("discovery scheduled");
}

#[test]
fn test_admin_session_failure_leaves_watcher_stopped() {
    let fleet = Fleet::new();
    let mut sessions = MockSessionFactory::new();
    sessions.expect_open().times(2).returning(|config, _| {
        Err(Error::SessionOpen {
            server_url: config.server_url,
            reason: "unauthorized".to_string(),
        })
    });
    let target = Arc::new(RecordingTarget::new());
    let mut watcher = watcher(&fleet, target, Arc::new(sessions));
    let admin_signal = Arc::new(Notify::new());

    assert!(watcher.start(&admin_signal).is_err());
    assert!(!watcher.is_started());
    assert!(watcher.start(&admin_signal).is_err());
}
