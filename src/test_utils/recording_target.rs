use std::collections::HashSet;

use parking_lot::Mutex;

use crate::notifier::ChangeNotification;
use crate::notifier::NotifierTarget;
use crate::Error;
use crate::ListenIdent;

/// Accepts every realm except the rejected virtual paths, and records each callback.
#[derive(Debug, Default)]
pub struct RecordingTarget {
    rejected: HashSet<String>,
    filter_calls: Mutex<Vec<String>>,
    observed: Mutex<Vec<ListenIdent>>,
    notifications: Mutex<Vec<ChangeNotification>>,
    failures: Mutex<Vec<(Option<ListenIdent>, String)>>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(virtual_paths: &[&str]) -> Self {
        Self {
            rejected: virtual_paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn filter_calls(&self) -> Vec<String> {
        self.filter_calls.lock().clone()
    }

    pub fn filter_count(
        &self,
        virtual_path: &str,
    ) -> usize {
        self.filter_calls
            .lock()
            .iter()
            .filter(|p| p.as_str() == virtual_path)
            .count()
    }

    pub fn observed(&self) -> Vec<ListenIdent> {
        self.observed.lock().clone()
    }

    pub fn notifications(&self) -> Vec<ChangeNotification> {
        self.notifications.lock().clone()
    }

    pub fn notifications_for(
        &self,
        listen_ident: ListenIdent,
    ) -> Vec<ChangeNotification> {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.listen_ident == listen_ident)
            .cloned()
            .collect()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.lock().len()
    }

    /// `(listen_ident, error message)`; `None` for discovery failures
    pub fn failures(&self) -> Vec<(Option<ListenIdent>, String)> {
        self.failures.lock().clone()
    }
}

impl NotifierTarget for RecordingTarget {
    fn filter(
        &self,
        virtual_path: &str,
    ) -> bool {
        self.filter_calls.lock().push(virtual_path.to_string());
        !self.rejected.contains(virtual_path)
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
        self.notifications.lock().push(notification);
    }

    fn notification_failed(
        &self,
        listen_ident: ListenIdent,
        error: &Error,
    ) {
        self.failures.lock().push((Some(listen_ident), error.to_string()));
    }

    fn discovery_failed(
        &self,
        error: &Error,
    ) {
        self.failures.lock().push((None, error.to_string()));
    }
}
