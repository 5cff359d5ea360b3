use std::rc::Rc;

use anyhow::{Context, Result};
use backstop_core::model::{Metrics, Properties};
use serde_json::Value;
use tracing::info;

use crate::App;

pub const LANGUAGE_KEY: &str = "language";

impl<'a> App<'a> {
    /// The key-value store as last pushed by the backend.
    pub fn properties(&self) -> Rc<Properties> {
        self.properties.get()
    }

    pub fn language(&self) -> Option<String> {
        self.properties
            .get()
            .get(LANGUAGE_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Seeds the language entry from the backend store.
    pub async fn load_language(&self) -> Result<()> {
        if let Some(value) = self.store_get(LANGUAGE_KEY).await? {
            self.properties.update(|properties| {
                properties.insert(LANGUAGE_KEY.to_string(), value);
            });
        }
        Ok(())
    }

    pub async fn set_language(&self, code: &str) -> Result<()> {
        self.store_set(LANGUAGE_KEY, Value::String(code.to_string()))
            .await
    }

    pub async fn store_get(&self, key: &str) -> Result<Option<Value>> {
        self.backend
            .store_get(key)
            .await
            .with_context(|| format!("failed to read property '{key}'"))
    }

    pub async fn store_set(&self, key: &str, value: Value) -> Result<()> {
        self.backend
            .store_set(key, value)
            .await
            .with_context(|| format!("failed to write property '{key}'"))?;
        info!(key, "property written");
        Ok(())
    }

    pub async fn store_del(&self, key: &str) -> Result<()> {
        self.backend
            .store_del(key)
            .await
            .with_context(|| format!("failed to delete property '{key}'"))?;
        info!(key, "property deleted");
        Ok(())
    }

    pub async fn auto_start(&self) -> Result<bool> {
        self.backend
            .auto_start()
            .await
            .context("failed to read auto-start state")
    }

    pub async fn set_auto_start(&self, enabled: bool) -> Result<()> {
        self.backend
            .set_auto_start(enabled)
            .await
            .context("failed to change auto-start state")?;
        info!(enabled, "auto-start changed");
        Ok(())
    }

    pub async fn metrics(&self) -> Result<Metrics> {
        self.backend
            .metrics()
            .await
            .context("failed to read metrics")
    }
}
