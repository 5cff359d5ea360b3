#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use backstop_core::bridge::{Backend, BackendEvent, BridgeError};
use backstop_core::model::{
    ActionBatch, ApplyErrors, ConcreteRule, Configuration, Metrics, Properties, Rule, ScanStatus,
};
use serde_json::Value;
use tokio::sync::{Notify, broadcast};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetConfig,
    SetConfig(Configuration),
    ScanStatus,
    StartFullScan,
    StopFullScan,
    ApplyActionBatch(ActionBatch),
    StoreGet(String),
    StoreSet(String, Value),
    StoreDel(String),
    AutoStart,
    SetAutoStart(bool),
    Metrics,
}

impl Call {
    pub fn command(&self) -> &'static str {
        match self {
            Self::GetConfig => "get_config",
            Self::SetConfig(_) => "set_config",
            Self::ScanStatus => "scan_status",
            Self::StartFullScan => "start_full_scan",
            Self::StopFullScan => "stop_full_scan",
            Self::ApplyActionBatch(_) => "apply_action_batch",
            Self::StoreGet(_) => "store_get",
            Self::StoreSet(_, _) => "store_set",
            Self::StoreDel(_) => "store_del",
            Self::AutoStart => "auto_start",
            Self::SetAutoStart(_) => "set_auto_start",
            Self::Metrics => "metrics",
        }
    }
}

/// In-memory backend that records every call and can be scripted to fail.
///
/// Successful saves and scan commands push the same events a real backend
/// would, unless echoing is turned off.
pub struct FakeBackend {
    config: Mutex<Configuration>,
    status: Mutex<ScanStatus>,
    store: Mutex<Properties>,
    auto_start: Mutex<bool>,
    metrics: Mutex<Metrics>,
    failures: Mutex<HashMap<&'static str, VecDeque<BridgeError>>>,
    calls: Mutex<Vec<Call>>,
    events: Mutex<broadcast::Sender<BackendEvent>>,
    capacity: usize,
    echo: AtomicBool,
    gate_saves: AtomicBool,
    save_gate: Notify,
}

impl FakeBackend {
    pub fn new(config: Configuration) -> Self {
        Self::with_capacity(config, 64)
    }

    pub fn with_capacity(config: Configuration, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            config: Mutex::new(config),
            status: Mutex::new(ScanStatus::Idle),
            store: Mutex::new(Properties::new()),
            auto_start: Mutex::new(false),
            metrics: Mutex::new(Metrics::default()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            events: Mutex::new(events),
            capacity,
            echo: AtomicBool::new(true),
            gate_saves: AtomicBool::new(false),
            save_gate: Notify::new(),
        }
    }

    pub fn set_status(&self, status: ScanStatus) {
        *self.status.lock().expect("status lock") = status;
    }

    pub fn set_metrics(&self, metrics: Metrics) {
        *self.metrics.lock().expect("metrics lock") = metrics;
    }

    pub fn set_echo(&self, echo: bool) {
        self.echo.store(echo, Ordering::SeqCst);
    }

    pub fn fail_next(&self, command: &'static str, error: BridgeError) {
        self.failures
            .lock()
            .expect("failures lock")
            .entry(command)
            .or_default()
            .push_back(error);
    }

    /// Holds every `set_config` until [`FakeBackend::release_save`].
    pub fn gate_saves(&self) {
        self.gate_saves.store(true, Ordering::SeqCst);
    }

    pub fn release_save(&self) {
        self.save_gate.notify_one();
    }

    pub fn emit(&self, event: BackendEvent) {
        let _ = self.events.lock().expect("events lock").send(event);
    }

    /// Drops the current event sender so existing receivers see `Closed`.
    pub fn close_channel(&self) {
        let (events, _) = broadcast::channel(self.capacity);
        *self.events.lock().expect("events lock") = events;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn commands(&self) -> Vec<&'static str> {
        self.calls().iter().map(Call::command).collect()
    }

    pub fn stored_config(&self) -> Configuration {
        self.config.lock().expect("config lock").clone()
    }

    fn record(&self, call: Call) -> Result<(), BridgeError> {
        let command = call.command();
        self.calls.lock().expect("calls lock").push(call);
        match self
            .failures
            .lock()
            .expect("failures lock")
            .get_mut(command)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn echo(&self, event: BackendEvent) {
        if self.echo.load(Ordering::SeqCst) {
            self.emit(event);
        }
    }

    fn move_status(&self, status: ScanStatus) {
        self.set_status(status.clone());
        self.echo(BackendEvent::ScanStatusChanged(status));
    }

    fn push_properties(&self) {
        let properties = self.store.lock().expect("store lock").clone();
        self.echo(BackendEvent::PropertiesChanged(properties));
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_config(&self) -> Result<Configuration, BridgeError> {
        self.record(Call::GetConfig)?;
        Ok(self.stored_config())
    }

    async fn set_config(&self, config: &Configuration) -> Result<(), BridgeError> {
        self.record(Call::SetConfig(config.clone()))?;
        if self.gate_saves.load(Ordering::SeqCst) {
            self.save_gate.notified().await;
        }
        *self.config.lock().expect("config lock") = config.clone();
        self.echo(BackendEvent::ConfigChanged(config.clone()));
        Ok(())
    }

    async fn scan_status(&self) -> Result<ScanStatus, BridgeError> {
        self.record(Call::ScanStatus)?;
        Ok(self.status.lock().expect("status lock").clone())
    }

    async fn start_full_scan(&self) -> Result<(), BridgeError> {
        self.record(Call::StartFullScan)?;
        self.move_status(ScanStatus::Scanning {
            current_path: String::new(),
            found: 0,
        });
        Ok(())
    }

    async fn stop_full_scan(&self) -> Result<(), BridgeError> {
        self.record(Call::StopFullScan)?;
        self.move_status(ScanStatus::Idle);
        Ok(())
    }

    async fn apply_action_batch(&self, batch: &ActionBatch) -> Result<(), BridgeError> {
        self.record(Call::ApplyActionBatch(batch.clone()))
    }

    async fn store_get(&self, key: &str) -> Result<Option<Value>, BridgeError> {
        self.record(Call::StoreGet(key.to_string()))?;
        Ok(self.store.lock().expect("store lock").get(key).cloned())
    }

    async fn store_set(&self, key: &str, value: Value) -> Result<(), BridgeError> {
        self.record(Call::StoreSet(key.to_string(), value.clone()))?;
        self.store
            .lock()
            .expect("store lock")
            .insert(key.to_string(), value);
        self.push_properties();
        Ok(())
    }

    async fn store_del(&self, key: &str) -> Result<(), BridgeError> {
        self.record(Call::StoreDel(key.to_string()))?;
        self.store.lock().expect("store lock").remove(key);
        self.push_properties();
        Ok(())
    }

    async fn auto_start(&self) -> Result<bool, BridgeError> {
        self.record(Call::AutoStart)?;
        Ok(*self.auto_start.lock().expect("auto start lock"))
    }

    async fn set_auto_start(&self, enabled: bool) -> Result<(), BridgeError> {
        self.record(Call::SetAutoStart(enabled))?;
        *self.auto_start.lock().expect("auto start lock") = enabled;
        Ok(())
    }

    async fn metrics(&self) -> Result<Metrics, BridgeError> {
        self.record(Call::Metrics)?;
        Ok(self.metrics.lock().expect("metrics lock").clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.lock().expect("events lock").subscribe()
    }
}

pub fn sample_config() -> Configuration {
    let mut rules = BTreeMap::new();
    rules.insert("dev".to_string(), Rule::Merge(vec!["rust".to_string()]));
    rules.insert(
        "rust".to_string(),
        Rule::Concrete(ConcreteRule {
            excludes: vec!["target".to_string()],
            if_exists: vec!["Cargo.toml".to_string()],
        }),
    );

    Configuration {
        no_include: false,
        directories: Vec::new(),
        skips: Vec::new(),
        rules,
    }
}

/// A batch with five proposed additions and two proposed removals.
pub fn five_add_batch() -> ActionBatch {
    ActionBatch {
        add: (1..=5).map(|index| format!("/home/u/p{index}/target")).collect(),
        remove: vec![
            "/home/u/old/target".to_string(),
            "/home/u/old/node_modules".to_string(),
        ],
    }
}

pub fn apply_errors(paths: &[&str]) -> ApplyErrors {
    ApplyErrors {
        errors: paths
            .iter()
            .map(|path| ((*path).to_string(), "operation not permitted".to_string()))
            .collect(),
    }
}
