mod apply;
mod config;
mod edit;
mod events;
mod properties;
mod save;
mod scan;
mod selection;
#[cfg(test)]
pub(crate) mod test_support;

use std::cell::Cell;

use anyhow::Result;
use backstop_core::bridge::Backend;
use backstop_core::graph::State;
use backstop_core::model::Properties;

pub use apply::ApplyOutcome;
pub use config::ConfigStore;
pub use edit::EditError;
pub use events::EventSubscription;
pub use properties::LANGUAGE_KEY;
pub use save::SaveError;
pub use scan::{ScanError, ScanPage, ScanProgress, ScanStep, ScanWorkflow};
pub use selection::{BatchSide, Selection, SelectionModel, VisibleRow, VisibleRows};

pub struct App<'a> {
    pub backend: &'a dyn Backend,
    config: ConfigStore,
    scan: ScanWorkflow,
    properties: State<Properties>,
    save_in_flight: Cell<bool>,
}

impl<'a> App<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            config: ConfigStore::new(),
            scan: ScanWorkflow::new(),
            properties: State::new("properties", Properties::new()),
            save_in_flight: Cell::new(false),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn scan(&self) -> &ScanWorkflow {
        &self.scan
    }

    /// Subscribes to push events, then pulls the initial state.
    ///
    /// Subscribing first means nothing pushed during the initial pulls is
    /// lost; the caller drains the returned subscription from then on.
    pub async fn start(&self) -> Result<EventSubscription<'_, 'a>> {
        let subscription = self.subscribe();
        self.load_config().await?;
        self.refresh_scan_status().await?;
        self.load_language().await?;
        Ok(subscription)
    }
}
