use std::cell::Cell;

use anyhow::{Context, Result};
use backstop_core::bridge::BridgeError;
use thiserror::Error;
use tracing::{info, warn};

use crate::App;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SaveError {
    #[error("configuration has not been loaded yet")]
    NotLoaded,
    #[error("a save is already in progress")]
    InFlight,
    #[error("backend rejected the configuration: {0}")]
    Rejected(String),
}

/// Marks a save as in flight until dropped, including when the save future
/// itself is dropped mid-await.
struct SaveGuard<'g> {
    flag: &'g Cell<bool>,
}

impl<'g> SaveGuard<'g> {
    fn acquire(flag: &'g Cell<bool>) -> Result<Self, SaveError> {
        if flag.replace(true) {
            return Err(SaveError::InFlight);
        }
        Ok(Self { flag })
    }
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

impl<'a> App<'a> {
    /// Pulls the backend configuration once and makes it the saved state.
    pub async fn load_config(&self) -> Result<()> {
        let config = self
            .backend
            .get_config()
            .await
            .context("failed to load configuration from backend")?;
        info!(
            rules = config.rules.len(),
            directories = config.directories.len(),
            "configuration loaded"
        );
        self.config.replace_final(config);
        Ok(())
    }

    /// Sends the draft to the backend.
    ///
    /// The saved state is not touched here; it follows the backend's
    /// `config_changed` push. On rejection the draft is kept as is.
    pub async fn save_config(&self) -> Result<()> {
        let draft = self.config.draft();
        let Some(config) = (*draft).as_ref() else {
            return Err(SaveError::NotLoaded.into());
        };

        let _guard = SaveGuard::acquire(&self.save_in_flight)?;
        info!(rules = config.rules.len(), "saving configuration");
        match self.backend.set_config(config).await {
            Ok(()) => Ok(()),
            Err(BridgeError::Rejected(reason)) => {
                warn!(%reason, "backend rejected configuration");
                Err(SaveError::Rejected(reason).into())
            }
            Err(error) => Err(error).context("failed to send configuration to backend"),
        }
    }

    pub fn save_in_flight(&self) -> bool {
        self.save_in_flight.get()
    }

    pub fn reset_config(&self) {
        self.config.reset();
    }
}
