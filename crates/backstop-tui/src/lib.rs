mod keymap;
mod scan_flow;
#[cfg(test)]
pub(crate) mod test_support;
mod theme;
mod ui;

use std::io::{Stdout, stdout};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use backstop_app::{App, EventSubscription};
use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::scan_flow::{FlowSignal, ScanDriver, ScanFlow};
use crate::ui::modal::render_error_modal;

const TICK_RATE: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiExit {
    Completed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanUiOptions {
    /// Most rows shown per side of the batch at once.
    pub display_cap: usize,
}

pub(crate) struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    pub(crate) fn enter() -> Result<Self> {
        let terminal = enter_with_ops(
            || enable_raw_mode().context("failed to enable raw mode"),
            || {
                let mut out = stdout();
                execute!(out, EnterAlternateScreen, Hide)
                    .context("failed to enter alternate screen")
            },
            || {
                let backend = CrosstermBackend::new(stdout());
                Terminal::new(backend).context("failed to create terminal backend")
            },
            || {
                let mut out = stdout();
                execute!(out, Show, LeaveAlternateScreen)
                    .context("failed to restore terminal screen during rollback")
            },
            || disable_raw_mode().context("failed to disable raw mode during rollback"),
        )?;
        Ok(Self { terminal })
    }

    pub(crate) fn draw<F>(&mut self, draw_fn: F) -> Result<()>
    where
        F: FnOnce(&mut ratatui::Frame<'_>),
    {
        self.terminal
            .draw(draw_fn)
            .context("failed to render terminal")?;
        Ok(())
    }

    pub(crate) fn autoresize(&mut self) -> Result<()> {
        self.terminal
            .autoresize()
            .context("failed to autoresize terminal")
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = execute!(self.terminal.backend_mut(), Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Runs the terminal setup steps in order. When a step fails, the steps
/// already taken are undone in reverse before the error is returned.
fn enter_with_ops<T, EnableRaw, EnterAlt, CreateTerminal, LeaveAlt, DisableRaw>(
    mut enable_raw_mode_op: EnableRaw,
    mut enter_alt_screen_op: EnterAlt,
    mut create_terminal_op: CreateTerminal,
    mut leave_alt_screen_op: LeaveAlt,
    mut disable_raw_mode_op: DisableRaw,
) -> Result<T>
where
    EnableRaw: FnMut() -> Result<()>,
    EnterAlt: FnMut() -> Result<()>,
    CreateTerminal: FnMut() -> Result<T>,
    LeaveAlt: FnMut() -> Result<()>,
    DisableRaw: FnMut() -> Result<()>,
{
    enable_raw_mode_op()?;

    if let Err(error) = enter_alt_screen_op() {
        let cleanup = rollback(false, &mut leave_alt_screen_op, &mut disable_raw_mode_op);
        return Err(with_cleanup(error, cleanup));
    }

    create_terminal_op().map_err(|error| {
        let cleanup = rollback(true, &mut leave_alt_screen_op, &mut disable_raw_mode_op);
        with_cleanup(error, cleanup)
    })
}

fn rollback<LeaveAlt, DisableRaw>(
    alt_screen_entered: bool,
    leave_alt_screen_op: &mut LeaveAlt,
    disable_raw_mode_op: &mut DisableRaw,
) -> Vec<String>
where
    LeaveAlt: FnMut() -> Result<()>,
    DisableRaw: FnMut() -> Result<()>,
{
    let mut failures = Vec::new();
    if alt_screen_entered && let Err(error) = leave_alt_screen_op() {
        failures.push(format!("{error:#}"));
    }
    if let Err(error) = disable_raw_mode_op() {
        failures.push(format!("{error:#}"));
    }
    failures
}

fn with_cleanup(setup_error: anyhow::Error, cleanup: Vec<String>) -> anyhow::Error {
    if cleanup.is_empty() {
        return setup_error;
    }
    anyhow!(
        "{setup_error:#}\nterminal rollback cleanup failed: {}",
        cleanup.join("\n")
    )
}

/// Runs the interactive scan workflow until the user leaves it.
///
/// Backend pushes queued on `events` are applied before every frame, so the
/// screen follows the daemon while the user is idle.
pub fn run_scan<'s, 'a>(
    app: &'s App<'a>,
    runtime: &'s Runtime,
    events: EventSubscription<'s, 'a>,
    options: ScanUiOptions,
) -> Result<UiExit> {
    let driver = ScanDriver::new(app, runtime, events);
    let mut flow = ScanFlow::new(options.display_cap);
    let mut session = TerminalSession::enter()?;
    let mut global_error: Option<String> = None;
    info!(display_cap = options.display_cap, "scan screen opened");

    loop {
        if let Err(error) = driver.pump() {
            warn!(error = %format!("{error:#}"), "failed to apply backend events");
            global_error.get_or_insert_with(|| format!("{error:#}"));
        }

        session.draw(|frame| {
            flow.render(frame, app);
            if let Some(message) = global_error.as_deref() {
                render_global_error(frame, message);
            }
        })?;

        if !event::poll(TICK_RATE).context("failed to poll terminal event")? {
            continue;
        }

        let key = match event::read().context("failed to read terminal event")? {
            Event::Resize(_, _) => {
                session.autoresize()?;
                continue;
            }
            Event::Key(key) if matches!(key.kind, KeyEventKind::Press) => key,
            _ => continue,
        };

        if keymap::is_ctrl_c(key) {
            return Ok(UiExit::Canceled);
        }

        if global_error.is_some() {
            if keymap::is_confirm(key) || keymap::is_back(key) {
                global_error = None;
            }
            continue;
        }

        match flow.on_key(key, &driver) {
            Ok(FlowSignal::Continue) => {}
            Ok(FlowSignal::Exit(exit)) => return Ok(exit),
            Err(error) => {
                warn!(error = %format!("{error:#}"), "scan action failed");
                global_error = Some(format!("{error:#}"));
            }
        }
    }
}

fn render_global_error(frame: &mut ratatui::Frame<'_>, message: &str) {
    let text = format!("Operation failed.\n\n{message}");
    render_error_modal(frame, &text, "Enter/Esc: continue");
}

pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let pct_x = percent_x.min(100);
    let pct_y = percent_y.min(100);

    let [_, vertical, _] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - pct_y) / 2),
            Constraint::Percentage(pct_y),
            Constraint::Percentage((100 - pct_y) / 2),
        ])
        .areas(area);
    let [_, horizontal, _] = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - pct_x) / 2),
            Constraint::Percentage(pct_x),
            Constraint::Percentage((100 - pct_x) / 2),
        ])
        .areas(vertical);
    horizontal
}
