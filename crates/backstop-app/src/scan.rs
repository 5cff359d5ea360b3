use std::fmt;
use std::rc::Rc;

use anyhow::{Context, Result};
use backstop_core::graph::{Derived, State};
use backstop_core::model::{ApplyErrors, ScanStatus};
use thiserror::Error;
use tracing::{debug, info};

use crate::App;
use crate::apply::ApplyOutcome;
use crate::selection::SelectionModel;

/// Client-local overlay on top of the backend scan status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanPage {
    #[default]
    Scan,
    Detail,
    Applying,
    Done,
    Log,
}

impl ScanPage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Detail => "detail",
            Self::Applying => "applying",
            Self::Done => "done",
            Self::Log => "log",
        }
    }
}

impl fmt::Display for ScanPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    Idle,
    Scanning,
    Result,
}

impl ScanStep {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Result => "result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub current_path: String,
    pub found: u64,
}

impl ScanProgress {
    pub const NOT_SCANNING: &'static str = "N/A";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("cannot move from the {from} page to the {to} page")]
    InvalidTransition { from: ScanPage, to: ScanPage },
    #[error("no scan result is available")]
    NoResult,
}

pub struct ScanWorkflow {
    status: State<ScanStatus>,
    step: Derived<ScanStep>,
    current: Derived<ScanProgress>,
    page: State<ScanPage>,
    apply_errors: State<Option<ApplyErrors>>,
    rejection: State<Option<String>>,
    outcome: State<Option<ApplyOutcome>>,
    selection: SelectionModel,
}

impl Default for ScanWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanWorkflow {
    pub fn new() -> Self {
        let status = State::new("scan_status", ScanStatus::Idle);

        let step = {
            let source = status.clone();
            Derived::memoized(
                "scan_step",
                vec![status.dependency()],
                move || match source.get().as_ref() {
                    ScanStatus::Idle => ScanStep::Idle,
                    ScanStatus::Scanning { .. } => ScanStep::Scanning,
                    ScanStatus::Result(_) => ScanStep::Result,
                },
                |next, previous| next == previous,
            )
        };

        let current = {
            let source = status.clone();
            Derived::memoized(
                "scan_current",
                vec![status.dependency()],
                move || match source.get().as_ref() {
                    ScanStatus::Scanning {
                        current_path,
                        found,
                    } => ScanProgress {
                        current_path: current_path.clone(),
                        found: *found,
                    },
                    _ => ScanProgress {
                        current_path: ScanProgress::NOT_SCANNING.to_string(),
                        found: 0,
                    },
                },
                |next, previous| next == previous,
            )
        };

        let selection = SelectionModel::new(&status);

        Self {
            status,
            step,
            current,
            page: State::new("scan_page", ScanPage::Scan),
            apply_errors: State::new("apply_errors", None),
            rejection: State::new("apply_rejection", None),
            outcome: State::new("apply_outcome", None),
            selection,
        }
    }

    pub fn status(&self) -> Rc<ScanStatus> {
        self.status.get()
    }

    pub fn step(&self) -> ScanStep {
        *self.step.get()
    }

    pub fn step_node(&self) -> &Derived<ScanStep> {
        &self.step
    }

    pub fn current(&self) -> Rc<ScanProgress> {
        self.current.get()
    }

    pub fn page(&self) -> ScanPage {
        *self.page.get()
    }

    pub fn selection(&self) -> &SelectionModel {
        &self.selection
    }

    pub fn apply_errors(&self) -> Rc<Option<ApplyErrors>> {
        self.apply_errors.get()
    }

    /// The reason the backend refused the last batch as a whole, if it did.
    pub fn rejection(&self) -> Rc<Option<String>> {
        self.rejection.get()
    }

    pub fn outcome(&self) -> Rc<Option<ApplyOutcome>> {
        self.outcome.get()
    }

    fn has_errors(&self) -> bool {
        (*self.apply_errors.get())
            .as_ref()
            .is_some_and(|errors| !errors.is_empty())
    }

    fn transition(&self, allowed: bool, to: ScanPage) -> Result<(), ScanError> {
        let from = self.page();
        if !allowed {
            return Err(ScanError::InvalidTransition { from, to });
        }
        debug!(%from, %to, "scan page changed");
        self.page.set(to);
        Ok(())
    }

    /// Opens the per-path review of a finished scan.
    pub fn open_detail(&self) -> Result<(), ScanError> {
        if self.page() == ScanPage::Scan && self.step() != ScanStep::Result {
            return Err(ScanError::NoResult);
        }
        self.transition(self.page() == ScanPage::Scan, ScanPage::Detail)
    }

    pub fn close_detail(&self) -> Result<(), ScanError> {
        self.transition(self.page() == ScanPage::Detail, ScanPage::Scan)
    }

    pub fn show_log(&self) -> Result<(), ScanError> {
        self.transition(
            self.page() == ScanPage::Done && self.has_errors(),
            ScanPage::Log,
        )
    }

    pub fn hide_log(&self) -> Result<(), ScanError> {
        self.transition(self.page() == ScanPage::Log, ScanPage::Done)
    }

    pub(crate) fn set_status(&self, status: ScanStatus) {
        self.status.set(status);
        self.selection.sync();
    }

    pub(crate) fn set_page(&self, page: ScanPage) {
        self.page.set(page);
    }

    pub(crate) fn finish_apply(
        &self,
        errors: Option<ApplyErrors>,
        rejection: Option<String>,
        outcome: ApplyOutcome,
    ) {
        self.apply_errors.set(errors);
        self.rejection.set(rejection);
        self.outcome.set(Some(outcome));
        self.page.set(ScanPage::Done);
    }
}

impl<'a> App<'a> {
    pub async fn refresh_scan_status(&self) -> Result<()> {
        let status = self
            .backend
            .scan_status()
            .await
            .context("failed to read scan status")?;
        self.scan.set_status(status);
        Ok(())
    }

    pub async fn start_scan(&self) -> Result<()> {
        self.backend
            .start_full_scan()
            .await
            .context("failed to start full scan")?;
        info!("full scan requested");
        Ok(())
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.backend
            .stop_full_scan()
            .await
            .context("failed to stop full scan")?;
        info!("full scan stop requested");
        Ok(())
    }

    /// Leaves the done or log page: stops the backend scan, then returns to
    /// the scan page. A failed stop leaves the page where it was.
    pub async fn restart_scan(&self) -> Result<()> {
        let from = self.scan.page();
        if !matches!(from, ScanPage::Done | ScanPage::Log) {
            return Err(ScanError::InvalidTransition {
                from,
                to: ScanPage::Scan,
            }
            .into());
        }

        self.stop_scan().await?;
        self.scan.set_page(ScanPage::Scan);
        Ok(())
    }
}
