use std::time::Duration;

use anyhow::{Context, Result};
use backstop_core::bridge::BackendEvent;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::App;

/// A live subscription to backend push events.
///
/// Events are only applied when the owner drains them, one at a time and in
/// the order they were received. Dropping the value ends the subscription.
pub struct EventSubscription<'s, 'a> {
    app: &'s App<'a>,
    receiver: Receiver<BackendEvent>,
}

impl<'a> App<'a> {
    pub fn subscribe(&self) -> EventSubscription<'_, 'a> {
        debug!("subscribing to backend events");
        EventSubscription {
            app: self,
            receiver: self.backend.subscribe(),
        }
    }

    pub(crate) fn apply_event(&self, event: BackendEvent) {
        debug!(event = event.name(), "applying backend event");
        match event {
            BackendEvent::ConfigChanged(config) => self.config.replace_final(config),
            BackendEvent::ScanStatusChanged(status) => self.scan.set_status(status),
            BackendEvent::PropertiesChanged(properties) => self.properties.set(properties),
        }
    }

    /// Re-pulls everything the event stream would have told us about.
    pub async fn resync(&self) -> Result<()> {
        self.load_config().await?;
        self.refresh_scan_status().await?;
        Ok(())
    }
}

impl<'s, 'a> EventSubscription<'s, 'a> {
    fn resubscribe(&mut self) {
        warn!("backend event channel closed; resubscribing");
        self.receiver = self.app.backend.subscribe();
    }

    async fn recover_lag(&mut self, skipped: u64) -> Result<()> {
        warn!(skipped, "missed backend events; resynchronizing");
        self.app
            .resync()
            .await
            .context("failed to resynchronize after missed events")
    }

    /// Applies every event already received and returns how many there were.
    pub async fn drain_events(&mut self) -> Result<usize> {
        let mut applied = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.app.apply_event(event);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(skipped)) => self.recover_lag(skipped).await?,
                Err(TryRecvError::Closed) => {
                    self.resubscribe();
                    break;
                }
            }
        }
        Ok(applied)
    }

    /// Waits for the next event and applies it. Returns `false` when the
    /// channel closed and a fresh subscription was taken instead.
    pub async fn next_event(&mut self) -> Result<bool> {
        match self.receiver.recv().await {
            Ok(event) => {
                self.app.apply_event(event);
                Ok(true)
            }
            Err(RecvError::Lagged(skipped)) => {
                self.recover_lag(skipped).await?;
                Ok(true)
            }
            Err(RecvError::Closed) => {
                self.resubscribe();
                Ok(false)
            }
        }
    }

    /// Applies events until `done` holds for the app or `timeout` elapses.
    /// Returns whether the condition was reached.
    pub async fn settle_until<F>(&mut self, timeout: Duration, done: F) -> Result<bool>
    where
        F: Fn(&App<'a>) -> bool,
    {
        self.drain_events().await?;
        let deadline = tokio::time::Instant::now() + timeout;
        while !done(self.app) {
            match tokio::time::timeout_at(deadline, self.next_event()).await {
                Ok(result) => {
                    if !result? {
                        return Ok(done(self.app));
                    }
                }
                Err(_) => return Ok(false),
            }
        }
        Ok(true)
    }
}

impl Drop for EventSubscription<'_, '_> {
    fn drop(&mut self) {
        debug!("backend event subscription dropped");
    }
}
