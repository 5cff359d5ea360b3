//! Newline-delimited JSON client for the backend's Unix socket.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{Backend, BackendEvent, BridgeError, decode};
use crate::model::{ActionBatch, ApplyErrors, Configuration, Metrics, ScanStatus};

const EVENT_CAPACITY: usize = 256;

type Reply = Result<Value, Value>;
type Pending = Arc<Mutex<PendingCalls>>;

/// Callers waiting on a response. Once the reader stops, `closed` is set
/// and no new caller is registered.
#[derive(Default)]
struct PendingCalls {
    senders: HashMap<u64, oneshot::Sender<Reply>>,
    closed: bool,
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    command: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingFrame {
    Response {
        id: u64,
        #[serde(default)]
        ok: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
}

pub struct RemoteBackend {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU64,
    events: broadcast::Sender<BackendEvent>,
    reader: JoinHandle<()>,
}

impl RemoteBackend {
    pub async fn connect(path: &Path) -> Result<Self, BridgeError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| BridgeError::Transport { source })?;
        info!(socket = %path.display(), "connected to backend");

        let (read_half, write_half) = stream.into_split();
        let pending: Pending = Arc::new(Mutex::new(PendingCalls::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let reader = tokio::spawn(read_frames(read_half, Arc::clone(&pending), events.clone()));

        Ok(Self {
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
            events,
            reader,
        })
    }

    async fn request(&self, command: &str, args: Value) -> Result<Reply, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&Request { id, command, args }).map_err(|source| {
            BridgeError::Protocol {
                message: format!("failed to encode {command}: {source}"),
            }
        })?;
        line.push('\n');

        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                debug!(command, "backend connection already closed");
                return Err(BridgeError::Closed);
            }
            pending.senders.insert(id, sender);
        }

        let written = {
            let mut writer = self.writer.lock().await;
            writer.write_all(line.as_bytes()).await
        };
        if let Err(source) = written {
            lock(&self.pending).senders.remove(&id);
            return Err(BridgeError::Transport { source });
        }
        debug!(id, command, "request sent");

        receiver.await.map_err(|_| BridgeError::Closed)
    }

    async fn call(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        self.request(command, args)
            .await?
            .map_err(|payload| BridgeError::Rejected(error_text(payload)))
    }
}

impl Drop for RemoteBackend {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn error_text(payload: Value) -> String {
    match payload {
        Value::String(message) => message,
        other => other.to_string(),
    }
}

async fn read_frames(read_half: OwnedReadHalf, pending: Pending, events: broadcast::Sender<BackendEvent>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => route_frame(&line, &pending, &events),
            Ok(None) => {
                debug!("backend closed the connection");
                break;
            }
            Err(error) => {
                warn!(%error, "failed to read from backend");
                break;
            }
        }
    }

    // Dropping the senders wakes every waiting caller with `Closed`.
    let mut pending = lock(&pending);
    pending.closed = true;
    pending.senders.clear();
}

fn route_frame(line: &str, pending: &Pending, events: &broadcast::Sender<BackendEvent>) {
    if line.trim().is_empty() {
        return;
    }

    let frame: IncomingFrame = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(%error, "dropping malformed frame from backend");
            return;
        }
    };

    match frame {
        IncomingFrame::Response { id, ok, error } => {
            let reply = match error {
                Some(error) => Err(error),
                None => Ok(ok.unwrap_or(Value::Null)),
            };
            match lock(pending).senders.remove(&id) {
                Some(sender) => {
                    let _ = sender.send(reply);
                }
                None => warn!(id, "response for unknown request"),
            }
        }
        IncomingFrame::Event { event, payload } => match BackendEvent::from_wire(&event, payload) {
            Ok(event) => {
                debug!(event = event.name(), "event received");
                if events.send(event).is_err() {
                    debug!("no subscribers for backend event");
                }
            }
            Err(error) => warn!(%error, "dropping backend event"),
        },
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn get_config(&self) -> Result<Configuration, BridgeError> {
        decode("get_config", self.call("get_config", json!({})).await?)
    }

    async fn set_config(&self, config: &Configuration) -> Result<(), BridgeError> {
        self.call("set_config", json!({ "config": config })).await?;
        Ok(())
    }

    async fn scan_status(&self) -> Result<ScanStatus, BridgeError> {
        decode("scan_status", self.call("scan_status", json!({})).await?)
    }

    async fn start_full_scan(&self) -> Result<(), BridgeError> {
        self.call("start_full_scan", json!({})).await?;
        Ok(())
    }

    async fn stop_full_scan(&self) -> Result<(), BridgeError> {
        self.call("stop_full_scan", json!({})).await?;
        Ok(())
    }

    async fn apply_action_batch(&self, batch: &ActionBatch) -> Result<(), BridgeError> {
        match self
            .request("apply_action_batch", json!({ "batch": batch }))
            .await?
        {
            Ok(_) => Ok(()),
            Err(payload) => match serde_json::from_value::<ApplyErrors>(payload.clone()) {
                Ok(errors) => Err(BridgeError::Apply(errors)),
                Err(_) => Err(BridgeError::Rejected(error_text(payload))),
            },
        }
    }

    async fn store_get(&self, key: &str) -> Result<Option<Value>, BridgeError> {
        let value = self.call("store_get", json!({ "key": key })).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn store_set(&self, key: &str, value: Value) -> Result<(), BridgeError> {
        self.call("store_set", json!({ "key": key, "value": value }))
            .await?;
        Ok(())
    }

    async fn store_del(&self, key: &str) -> Result<(), BridgeError> {
        self.call("store_del", json!({ "key": key })).await?;
        Ok(())
    }

    async fn auto_start(&self) -> Result<bool, BridgeError> {
        decode("auto_start", self.call("auto_start", json!({})).await?)
    }

    async fn set_auto_start(&self, enabled: bool) -> Result<(), BridgeError> {
        self.call("set_auto_start", json!({ "enabled": enabled }))
            .await?;
        Ok(())
    }

    async fn metrics(&self) -> Result<Metrics, BridgeError> {
        decode("metrics", self.call("metrics", json!({})).await?)
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::model::Rule;
    use crate::test_support::{Step, exchange, serve};

    #[tokio::test]
    async fn responses_are_routed_by_id() {
        let server = serve(exchange(Ok(json!({
            "no-include": false,
            "rules": {"dev": {"excludes": ["target"]}}
        }))));
        let backend = RemoteBackend::connect(server.path())
            .await
            .expect("connect");

        let config = backend.get_config().await.expect("config");
        assert!(matches!(config.rules.get("dev"), Some(Rule::Concrete(_))));

        let requests = server.finish().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["command"], json!("get_config"));
        assert!(requests[0]["id"].is_u64());
    }

    #[tokio::test]
    async fn set_config_rejection_carries_reason() {
        let server = serve(exchange(Err(json!("config file is read-only"))));
        let backend = RemoteBackend::connect(server.path())
            .await
            .expect("connect");

        let error = backend
            .set_config(&Configuration::default())
            .await
            .expect_err("rejected");
        assert!(matches!(error, BridgeError::Rejected(ref reason) if reason == "config file is read-only"));

        let requests = server.finish().await;
        assert_eq!(requests[0]["args"]["config"]["no-include"], json!(false));
    }

    #[tokio::test]
    async fn apply_failure_is_decoded_as_apply_errors() {
        let server = serve(exchange(Err(json!({
            "errors": {"/home/u/a": "permission denied"}
        }))));
        let backend = RemoteBackend::connect(server.path())
            .await
            .expect("connect");

        let batch = ActionBatch {
            add: vec!["/home/u/a".to_string()],
            remove: Vec::new(),
        };
        let error = backend
            .apply_action_batch(&batch)
            .await
            .expect_err("partial failure");
        let BridgeError::Apply(errors) = error else {
            panic!("expected apply errors");
        };
        assert_eq!(
            errors.errors.get("/home/u/a").map(String::as_str),
            Some("permission denied")
        );
        server.finish().await;
    }

    #[tokio::test]
    async fn events_are_published_to_subscribers() {
        let server = serve(vec![
            Step::Read,
            Step::Push(
                "scan_status_changed",
                json!({"step": "scanning", "content": {"current_path": "/srv", "found": 3}}),
            ),
            Step::Respond(Ok(json!({"step": "idle"}))),
        ]);
        let backend = RemoteBackend::connect(server.path())
            .await
            .expect("connect");
        let mut events = backend.subscribe();

        let status = backend.scan_status().await.expect("status");
        assert_eq!(status, ScanStatus::Idle);

        let event = events.try_recv().expect("event before response");
        assert!(matches!(
            event,
            BackendEvent::ScanStatusChanged(ScanStatus::Scanning { found: 3, .. })
        ));
        server.finish().await;
    }

    #[tokio::test]
    async fn null_store_value_reads_as_missing() {
        let server = serve(exchange(Ok(Value::Null)));
        let backend = RemoteBackend::connect(server.path())
            .await
            .expect("connect");

        assert_eq!(backend.store_get("language").await.expect("get"), None);
        server.finish().await;
    }

    #[tokio::test]
    async fn dropped_connection_fails_pending_calls() {
        let server = serve(vec![Step::Read]);
        let backend = RemoteBackend::connect(server.path())
            .await
            .expect("connect");

        let error = backend.stop_full_scan().await.expect_err("closed");
        assert!(matches!(error, BridgeError::Closed));
        server.finish().await;
    }

    #[tokio::test]
    async fn calls_after_backend_hangs_up_fail_fast() {
        let server = serve(vec![Step::CloseWrite, Step::Drain]);
        let backend = RemoteBackend::connect(server.path())
            .await
            .expect("connect");

        let result = tokio::time::timeout(Duration::from_secs(2), backend.scan_status())
            .await
            .expect("call returns instead of hanging");
        assert!(matches!(result, Err(BridgeError::Closed)));

        let again = tokio::time::timeout(Duration::from_secs(2), backend.metrics())
            .await
            .expect("second call returns");
        assert!(matches!(again, Err(BridgeError::Closed)));

        drop(backend);
        server.finish().await;
    }

    #[tokio::test]
    async fn missing_socket_is_transport_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = RemoteBackend::connect(&dir.path().join("absent.sock")).await;
        assert!(matches!(result, Err(BridgeError::Transport { .. })));
    }
}
