use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use backstop_core::bridge::{Backend, BackendEvent, BridgeError};
use backstop_core::model::{ActionBatch, ApplyErrors, Configuration, Metrics, ScanStatus};
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::sync::broadcast;

/// In-process backend that echoes scan status changes the way the daemon
/// does: every start or stop is followed by a `scan_status_changed` push.
pub(crate) struct StubBackend {
    status: Mutex<ScanStatus>,
    apply_failures: Mutex<Option<ApplyErrors>>,
    applied: Mutex<Vec<ActionBatch>>,
    calls: Mutex<Vec<&'static str>>,
    sender: broadcast::Sender<BackendEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("stub backend lock")
}

impl StubBackend {
    pub(crate) fn new(status: ScanStatus) -> Self {
        let (sender, _) = broadcast::channel(32);
        Self {
            status: Mutex::new(status),
            apply_failures: Mutex::new(None),
            applied: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub(crate) fn fail_apply(&self, paths: &[&str]) {
        let mut errors = ApplyErrors::default();
        for path in paths {
            errors
                .errors
                .insert((*path).to_string(), "permission denied".to_string());
        }
        *lock(&self.apply_failures) = Some(errors);
    }

    pub(crate) fn push_status(&self, status: ScanStatus) {
        *lock(&self.status) = status.clone();
        let _ = self.sender.send(BackendEvent::ScanStatusChanged(status));
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub(crate) fn applied(&self) -> Vec<ActionBatch> {
        lock(&self.applied).clone()
    }

    fn record(&self, command: &'static str) {
        lock(&self.calls).push(command);
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn get_config(&self) -> Result<Configuration, BridgeError> {
        self.record("get_config");
        Ok(Configuration::default())
    }

    async fn set_config(&self, _config: &Configuration) -> Result<(), BridgeError> {
        self.record("set_config");
        Ok(())
    }

    async fn scan_status(&self) -> Result<ScanStatus, BridgeError> {
        self.record("scan_status");
        Ok(lock(&self.status).clone())
    }

    async fn start_full_scan(&self) -> Result<(), BridgeError> {
        self.record("start_full_scan");
        self.push_status(ScanStatus::Scanning {
            current_path: "/home/u".to_string(),
            found: 0,
        });
        Ok(())
    }

    async fn stop_full_scan(&self) -> Result<(), BridgeError> {
        self.record("stop_full_scan");
        self.push_status(ScanStatus::Idle);
        Ok(())
    }

    async fn apply_action_batch(&self, batch: &ActionBatch) -> Result<(), BridgeError> {
        self.record("apply_action_batch");
        lock(&self.applied).push(batch.clone());
        match lock(&self.apply_failures).take() {
            Some(errors) => Err(BridgeError::Apply(errors)),
            None => Ok(()),
        }
    }

    async fn store_get(&self, _key: &str) -> Result<Option<Value>, BridgeError> {
        self.record("store_get");
        Ok(None)
    }

    async fn store_set(&self, _key: &str, _value: Value) -> Result<(), BridgeError> {
        self.record("store_set");
        Ok(())
    }

    async fn store_del(&self, _key: &str) -> Result<(), BridgeError> {
        self.record("store_del");
        Ok(())
    }

    async fn auto_start(&self) -> Result<bool, BridgeError> {
        Ok(false)
    }

    async fn set_auto_start(&self, _enabled: bool) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn metrics(&self) -> Result<Metrics, BridgeError> {
        Ok(Metrics::default())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.sender.subscribe()
    }
}

pub(crate) fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

pub(crate) fn sample_batch() -> ActionBatch {
    ActionBatch {
        add: vec![
            "/home/u/src/app/target".to_string(),
            "/home/u/src/web/node_modules".to_string(),
            "/home/u/.cache/pip".to_string(),
        ],
        remove: vec![
            "/home/u/old/node_modules".to_string(),
            "/home/u/old/build".to_string(),
        ],
    }
}
