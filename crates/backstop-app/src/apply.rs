use anyhow::{Context, Result};
use backstop_core::bridge::BridgeError;
use backstop_core::model::ApplyErrors;
use tracing::{info, warn};

use crate::App;
use crate::scan::{ScanError, ScanPage, ScanStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub attempted: usize,
    pub failed: usize,
}

impl ApplyOutcome {
    pub fn new(attempted: usize, failed: usize) -> Self {
        Self { attempted, failed }
    }

    /// Selected paths minus reported failures. Failures are assumed to name
    /// selected paths; the count never goes below zero.
    pub fn applied(&self) -> usize {
        self.attempted.saturating_sub(self.failed)
    }
}

impl<'a> App<'a> {
    /// Sends the current selection to the backend.
    ///
    /// Once the backend answers, the page moves to done whatever it said:
    /// per-path failures are kept as apply errors and a refusal of the whole
    /// batch is kept as the rejection reason. Failing to reach the backend
    /// puts the page back and is returned.
    pub async fn apply_selection(&self) -> Result<ApplyOutcome> {
        let from = self.scan.page();
        if !matches!(from, ScanPage::Scan | ScanPage::Detail) {
            return Err(ScanError::InvalidTransition {
                from,
                to: ScanPage::Applying,
            }
            .into());
        }
        if self.scan.step() != ScanStep::Result {
            return Err(ScanError::NoResult.into());
        }

        let batch = self.scan.selection().selection().to_batch();
        let attempted = batch.len();
        self.scan.set_page(ScanPage::Applying);
        info!(
            add = batch.add.len(),
            remove = batch.remove.len(),
            "applying action batch"
        );

        let (errors, rejection) = match self.backend.apply_action_batch(&batch).await {
            Ok(()) => (None, None),
            Err(BridgeError::Apply(errors)) => {
                warn!(failed = errors.len(), "some paths could not be applied");
                (Some(errors), None)
            }
            Err(BridgeError::Rejected(reason)) => {
                warn!(%reason, "backend rejected the action batch");
                (None, Some(reason))
            }
            Err(error) => {
                self.scan.set_page(from);
                return Err(error).context("failed to apply action batch");
            }
        };

        let failed = match &rejection {
            Some(_) => attempted,
            None => errors.as_ref().map_or(0, ApplyErrors::len),
        };
        let outcome = ApplyOutcome::new(attempted, failed);
        self.scan.finish_apply(errors, rejection, outcome);
        Ok(outcome)
    }
}
