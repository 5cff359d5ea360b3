use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::{ActionBatch, ApplyErrors, Configuration, Metrics, Properties, ScanStatus};

/// Push notifications published by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    ConfigChanged(Configuration),
    ScanStatusChanged(ScanStatus),
    PropertiesChanged(Properties),
}

impl BackendEvent {
    pub const CONFIG_CHANGED: &'static str = "config_changed";
    pub const SCAN_STATUS_CHANGED: &'static str = "scan_status_changed";
    pub const PROPERTIES_CHANGED: &'static str = "properties_changed";

    pub fn name(&self) -> &'static str {
        match self {
            Self::ConfigChanged(_) => Self::CONFIG_CHANGED,
            Self::ScanStatusChanged(_) => Self::SCAN_STATUS_CHANGED,
            Self::PropertiesChanged(_) => Self::PROPERTIES_CHANGED,
        }
    }

    pub fn from_wire(name: &str, payload: Value) -> Result<Self, BridgeError> {
        let event = match name {
            Self::CONFIG_CHANGED => Self::ConfigChanged(decode(name, payload)?),
            Self::SCAN_STATUS_CHANGED => Self::ScanStatusChanged(decode(name, payload)?),
            Self::PROPERTIES_CHANGED => Self::PropertiesChanged(decode(name, payload)?),
            other => {
                return Err(BridgeError::Protocol {
                    message: format!("unknown event '{other}'"),
                });
            }
        };
        Ok(event)
    }

    pub fn to_wire(&self) -> Result<Value, BridgeError> {
        let payload = match self {
            Self::ConfigChanged(config) => serde_json::to_value(config),
            Self::ScanStatusChanged(status) => serde_json::to_value(status),
            Self::PropertiesChanged(properties) => Ok(Value::Object(properties.clone())),
        };
        payload.map_err(|source| BridgeError::Protocol {
            message: format!("failed to encode {}: {source}", self.name()),
        })
    }
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    what: &str,
    value: Value,
) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|source| BridgeError::Protocol {
        message: format!("invalid {what} payload: {source}"),
    })
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to reach backend: {source}")]
    Transport {
        #[source]
        source: std::io::Error,
    },
    #[error("backend protocol error: {message}")]
    Protocol { message: String },
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error("{} path(s) failed to apply", .0.len())]
    Apply(ApplyErrors),
    #[error("backend connection closed")]
    Closed,
}

/// The remote backend as seen from the client.
///
/// Every command is asynchronous and may fail independently. Push events are
/// delivered through [`Backend::subscribe`].
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_config(&self) -> Result<Configuration, BridgeError>;
    async fn set_config(&self, config: &Configuration) -> Result<(), BridgeError>;
    async fn scan_status(&self) -> Result<ScanStatus, BridgeError>;
    async fn start_full_scan(&self) -> Result<(), BridgeError>;
    async fn stop_full_scan(&self) -> Result<(), BridgeError>;
    async fn apply_action_batch(&self, batch: &ActionBatch) -> Result<(), BridgeError>;
    async fn store_get(&self, key: &str) -> Result<Option<Value>, BridgeError>;
    async fn store_set(&self, key: &str, value: Value) -> Result<(), BridgeError>;
    async fn store_del(&self, key: &str) -> Result<(), BridgeError>;
    async fn auto_start(&self) -> Result<bool, BridgeError>;
    async fn set_auto_start(&self, enabled: bool) -> Result<(), BridgeError>;
    async fn metrics(&self) -> Result<Metrics, BridgeError>;

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn events_decode_by_name() {
        let event = BackendEvent::from_wire(
            BackendEvent::SCAN_STATUS_CHANGED,
            json!({"step": "scanning", "content": {"current_path": "/x", "found": 2}}),
        )
        .expect("scan event");

        assert_eq!(event.name(), "scan_status_changed");
        assert!(matches!(
            event,
            BackendEvent::ScanStatusChanged(ScanStatus::Scanning { found: 2, .. })
        ));
    }

    #[test]
    fn unknown_event_is_protocol_error() {
        let error = BackendEvent::from_wire("metrics_changed", Value::Null).expect_err("unknown");
        assert!(error.to_string().contains("unknown event 'metrics_changed'"));
    }

    #[test]
    fn malformed_payload_is_protocol_error() {
        let error = BackendEvent::from_wire(BackendEvent::PROPERTIES_CHANGED, json!([1, 2]))
            .expect_err("not a map");
        assert!(matches!(error, BridgeError::Protocol { .. }));
    }

    #[test]
    fn apply_error_reports_failure_count() {
        let mut errors = ApplyErrors::default();
        errors
            .errors
            .insert("/a".to_string(), "permission denied".to_string());
        assert_eq!(
            BridgeError::Apply(errors).to_string(),
            "1 path(s) failed to apply"
        );
    }
}
