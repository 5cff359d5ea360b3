use std::cell::RefCell;
use std::future::Future;

use anyhow::Result;
use backstop_app::{App, BatchSide, EventSubscription, ScanPage, ScanStep, VisibleRows};
use crossterm::event::KeyEvent;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span, Text};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::UiExit;
use crate::keymap;
use crate::theme;
use crate::ui::path_table::{PathTableRender, PathTableState};
use crate::ui::text::{
    compact_hint, focus_line, key_hint_height, key_hint_paragraph, label_value_line, plural,
    wrapped_paragraph,
};

/// Bridges the synchronous draw loop to the async app: commands run to
/// completion on `runtime`, and queued backend pushes are applied whenever
/// the loop asks for it.
pub(crate) struct ScanDriver<'s, 'a> {
    app: &'s App<'a>,
    runtime: &'s Runtime,
    events: RefCell<EventSubscription<'s, 'a>>,
}

impl<'s, 'a> ScanDriver<'s, 'a> {
    pub(crate) fn new(
        app: &'s App<'a>,
        runtime: &'s Runtime,
        events: EventSubscription<'s, 'a>,
    ) -> Self {
        Self {
            app,
            runtime,
            events: RefCell::new(events),
        }
    }

    pub(crate) fn app(&self) -> &'s App<'a> {
        self.app
    }

    /// Runs one command, then applies whatever it caused the backend to push.
    fn run<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let value = self.runtime.block_on(work)?;
        self.pump()?;
        Ok(value)
    }

    pub(crate) fn pump(&self) -> Result<usize> {
        let mut events = self.events.borrow_mut();
        self.runtime.block_on(events.drain_events())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowSignal {
    Continue,
    Exit(UiExit),
}

#[derive(Debug)]
pub(crate) struct ScanFlow {
    side: BatchSide,
    table: PathTableState,
    editing_filter: bool,
    log_offset: u16,
    cap: usize,
}

fn side_title(side: BatchSide) -> &'static str {
    match side {
        BatchSide::Add => "New exclusions",
        BatchSide::Remove => "Exclusions to lift",
    }
}

fn has_apply_errors(app: &App<'_>) -> bool {
    (*app.scan().apply_errors())
        .as_ref()
        .is_some_and(|errors| !errors.is_empty())
}

impl ScanFlow {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            side: BatchSide::Add,
            table: PathTableState::new(),
            editing_filter: false,
            log_offset: 0,
            cap,
        }
    }

    fn reset_view(&mut self) {
        self.side = BatchSide::Add;
        self.table.reset();
        self.editing_filter = false;
        self.log_offset = 0;
    }

    fn visible(&self, app: &App<'_>) -> VisibleRows {
        app.scan()
            .selection()
            .visible(self.side, self.table.filter(), self.cap)
    }

    pub(crate) fn on_key(&mut self, key: KeyEvent, driver: &ScanDriver<'_, '_>) -> Result<FlowSignal> {
        match driver.app().scan().page() {
            ScanPage::Scan => self.on_overview_key(key, driver),
            ScanPage::Detail => self.on_detail_key(key, driver),
            ScanPage::Applying => Ok(FlowSignal::Continue),
            ScanPage::Done => self.on_done_key(key, driver),
            ScanPage::Log => self.on_log_key(key, driver),
        }
    }

    fn on_overview_key(
        &mut self,
        key: KeyEvent,
        driver: &ScanDriver<'_, '_>,
    ) -> Result<FlowSignal> {
        if keymap::is_back(key) || keymap::is_quit(key) {
            return Ok(FlowSignal::Exit(UiExit::Completed));
        }

        let app = driver.app();
        match app.scan().step() {
            ScanStep::Idle if keymap::is_char(key, 's') => driver.run(app.start_scan())?,
            ScanStep::Scanning | ScanStep::Result if keymap::is_char(key, 'x') => {
                driver.run(app.stop_scan())?
            }
            ScanStep::Result if keymap::is_confirm(key) => {
                app.scan().open_detail()?;
                self.reset_view();
            }
            ScanStep::Result if keymap::is_char(key, 'a') => self.apply(driver)?,
            _ => {}
        }
        Ok(FlowSignal::Continue)
    }

    fn on_detail_key(&mut self, key: KeyEvent, driver: &ScanDriver<'_, '_>) -> Result<FlowSignal> {
        let app = driver.app();
        if self.editing_filter {
            if keymap::is_back(key) || keymap::is_confirm(key) {
                self.editing_filter = false;
            } else {
                self.table.on_filter_key(key);
            }
            return Ok(FlowSignal::Continue);
        }

        if keymap::is_quit(key) {
            return Ok(FlowSignal::Exit(UiExit::Completed));
        }
        if keymap::is_back(key) {
            app.scan().close_detail()?;
            self.reset_view();
            return Ok(FlowSignal::Continue);
        }
        if keymap::is_switch_side(key) {
            self.side = self.side.other();
            self.table.reset();
            return Ok(FlowSignal::Continue);
        }
        if keymap::is_filter(key) {
            self.editing_filter = true;
            return Ok(FlowSignal::Continue);
        }
        if keymap::is_confirm(key) {
            self.apply(driver)?;
            return Ok(FlowSignal::Continue);
        }

        let rows = self.visible(app);
        self.table.clamp(rows.rows.len());
        let selection = app.scan().selection();
        if keymap::is_up(key) {
            self.table.move_up();
        } else if keymap::is_down(key) {
            self.table.move_down(rows.rows.len());
        } else if keymap::is_toggle(key) {
            if let Some(row) = rows.rows.get(self.table.cursor()) {
                selection.toggle(self.side, &row.path);
            }
        } else if keymap::is_char(key, 'a') {
            selection.toggle_all(self.side);
        }
        Ok(FlowSignal::Continue)
    }

    fn on_done_key(&mut self, key: KeyEvent, driver: &ScanDriver<'_, '_>) -> Result<FlowSignal> {
        let app = driver.app();
        if keymap::is_back(key) || keymap::is_quit(key) {
            return Ok(FlowSignal::Exit(UiExit::Completed));
        }
        if keymap::is_char(key, 'l') && has_apply_errors(app) {
            app.scan().show_log()?;
            self.log_offset = 0;
        } else if keymap::is_char(key, 'r') {
            driver.run(app.restart_scan())?;
            self.reset_view();
        }
        Ok(FlowSignal::Continue)
    }

    fn on_log_key(&mut self, key: KeyEvent, driver: &ScanDriver<'_, '_>) -> Result<FlowSignal> {
        let app = driver.app();
        if keymap::is_quit(key) {
            return Ok(FlowSignal::Exit(UiExit::Completed));
        }
        if keymap::is_back(key) {
            app.scan().hide_log()?;
        } else if keymap::is_char(key, 'r') {
            driver.run(app.restart_scan())?;
            self.reset_view();
        } else if keymap::is_up(key) {
            self.log_offset = self.log_offset.saturating_sub(1);
        } else if keymap::is_down(key) {
            let count = (*app.scan().apply_errors())
                .as_ref()
                .map_or(0, |errors| errors.len());
            let last = u16::try_from(count.saturating_sub(1)).unwrap_or(u16::MAX);
            self.log_offset = self.log_offset.saturating_add(1).min(last);
        }
        Ok(FlowSignal::Continue)
    }

    fn apply(&mut self, driver: &ScanDriver<'_, '_>) -> Result<()> {
        let outcome = driver.run(driver.app().apply_selection())?;
        debug!(
            attempted = outcome.attempted,
            failed = outcome.failed,
            "selection applied"
        );
        self.reset_view();
        Ok(())
    }

    fn key_hint(&self, app: &App<'_>, width: u16) -> &'static str {
        match app.scan().page() {
            ScanPage::Scan => match app.scan().step() {
                ScanStep::Idle => compact_hint(
                    width,
                    "s: start full scan    Esc/q: exit",
                    "s: start scan    Esc/q: exit",
                    "s scan | q exit",
                ),
                ScanStep::Scanning => compact_hint(
                    width,
                    "x: stop scan    Esc/q: exit",
                    "x: stop scan    Esc/q: exit",
                    "x stop | q exit",
                ),
                ScanStep::Result => compact_hint(
                    width,
                    "Enter: review paths    a: apply selection    x: discard result    Esc/q: exit",
                    "Enter: review    a: apply    x: discard    Esc/q: exit",
                    "Enter review | a apply | x discard | q exit",
                ),
            },
            ScanPage::Detail if self.editing_filter => "Type to filter    Enter/Esc: done",
            ScanPage::Detail => compact_hint(
                width,
                "Space: toggle    a: toggle all    Tab: switch side    /: filter    j/k: move    Enter: apply    Esc: back",
                "Space: toggle    a: all    Tab: side    /: filter    Enter: apply    Esc: back",
                "Space toggle | Tab side | Enter apply | Esc back",
            ),
            ScanPage::Applying => "Applying selection...",
            ScanPage::Done if has_apply_errors(app) => compact_hint(
                width,
                "l: view errors    r: scan again    Esc/q: exit",
                "l: errors    r: scan again    Esc/q: exit",
                "l errors | r again | q exit",
            ),
            ScanPage::Done => compact_hint(
                width,
                "r: scan again    Esc/q: exit",
                "r: scan again    Esc/q: exit",
                "r again | q exit",
            ),
            ScanPage::Log => compact_hint(
                width,
                "j/k: scroll    r: scan again    Esc: back",
                "j/k: scroll    r: again    Esc: back",
                "j/k scroll | Esc back",
            ),
        }
    }

    pub(crate) fn render(&self, frame: &mut Frame<'_>, app: &App<'_>) {
        let area = frame.area();
        let key_text = self.key_hint(app, area.width);
        let footer_height = key_hint_height(area.width, key_text);
        let [header, body, footer] = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(6),
                Constraint::Length(footer_height),
            ])
            .areas(area);

        render_header(frame, header, app);
        match app.scan().page() {
            ScanPage::Scan => render_overview(frame, body, app),
            ScanPage::Detail => self.render_detail(frame, body, app),
            ScanPage::Applying => frame.render_widget(
                wrapped_paragraph(focus_line("Applying selection...")).block(theme::chrome("Apply")),
                body,
            ),
            ScanPage::Done => render_done(frame, body, app),
            ScanPage::Log => self.render_log(frame, body, app),
        }

        frame.render_widget(key_hint_paragraph(key_text).block(theme::key_block()), footer);
    }

    fn render_detail(&self, frame: &mut Frame<'_>, area: Rect, app: &App<'_>) {
        let [tabs, filter, table] = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Min(3),
            ])
            .areas(area);

        let batch = app.scan().selection().action_batch();
        let selection = app.scan().selection().selection();
        let mut spans = Vec::new();
        for side in [BatchSide::Add, BatchSide::Remove] {
            let available = match side {
                BatchSide::Add => batch.add.len(),
                BatchSide::Remove => batch.remove.len(),
            };
            let label = format!(
                " {} ({}/{available}) ",
                side_title(side),
                selection.side(side).len()
            );
            let style = if side == self.side {
                theme::table_highlight(theme::side_color(side))
            } else {
                theme::secondary_text()
            };
            spans.push(Span::styled(label, style));
            spans.push(Span::raw(" "));
        }
        frame.render_widget(Line::from(spans), tabs);

        let filter_title = if self.editing_filter {
            focus_line("Filter")
        } else {
            Line::from("Filter (/ to edit)")
        };
        self.table
            .render_filter(frame, filter, filter_title, self.editing_filter);

        let rows = self.visible(app);
        let empty_message = if self.table.filter().trim().is_empty() {
            "Nothing proposed on this side."
        } else {
            "No paths match the filter."
        };
        self.table.render_table(
            frame,
            table,
            &rows,
            PathTableRender {
                title: Line::from(side_title(self.side)),
                empty_message,
                color: theme::side_color(self.side),
            },
        );
    }

    fn render_log(&self, frame: &mut Frame<'_>, area: Rect, app: &App<'_>) {
        let errors = app.scan().apply_errors();
        let lines: Vec<Line<'static>> = (*errors)
            .iter()
            .flat_map(|errors| errors.errors.iter())
            .map(|(path, reason)| label_value_line(path.clone(), reason.clone()))
            .collect();
        let title = Line::from(Span::styled("Apply errors", theme::error_prompt()));
        frame.render_widget(
            wrapped_paragraph(Text::from(lines))
                .scroll((self.log_offset, 0))
                .block(theme::chrome(title)),
            area,
        );
    }
}

fn render_header(frame: &mut Frame<'_>, area: Rect, app: &App<'_>) {
    let step = app.scan().step();
    let text = Text::from(vec![
        Line::from(vec![
            Span::styled("Backend: ", theme::secondary_text()),
            Span::styled(step.label(), theme::step_style(step)),
        ]),
        label_value_line("Page", app.scan().page().label()),
    ]);
    frame.render_widget(wrapped_paragraph(text).block(theme::chrome("backstop")), area);
}

fn render_overview(frame: &mut Frame<'_>, area: Rect, app: &App<'_>) {
    let scan = app.scan();
    let lines = match scan.step() {
        ScanStep::Idle => vec![
            focus_line("No scan result yet"),
            Line::from("Press s to search the watched directories for paths to exclude."),
        ],
        ScanStep::Scanning => {
            let current = scan.current();
            vec![
                focus_line("Scanning"),
                label_value_line("Current path", current.current_path.clone()),
                label_value_line("Found", current.found.to_string()),
            ]
        }
        ScanStep::Result => {
            let batch = scan.selection().action_batch();
            vec![
                focus_line("Scan finished"),
                label_value_line(side_title(BatchSide::Add), plural(batch.add.len(), "path", "paths")),
                label_value_line(
                    side_title(BatchSide::Remove),
                    plural(batch.remove.len(), "path", "paths"),
                ),
                label_value_line("Selected", scan.selection().selected_count().to_string()),
            ]
        }
    };
    frame.render_widget(
        wrapped_paragraph(Text::from(lines)).block(theme::chrome("Scan")),
        area,
    );
}

fn render_done(frame: &mut Frame<'_>, area: Rect, app: &App<'_>) {
    let outcome = app.scan().outcome();
    let rejection = app.scan().rejection();
    let lines = match (*outcome, (*rejection).as_deref()) {
        (_, Some(reason)) => vec![
            Line::from(Span::styled(
                "The backend rejected the changes",
                theme::error_prompt(),
            )),
            label_value_line("Reason", reason.to_string()),
        ],
        (Some(outcome), None) if outcome.failed == 0 => vec![
            Line::from(Span::styled("All changes applied", theme::success_prompt())),
            label_value_line(
                "Applied",
                format!("{} of {}", outcome.applied(), outcome.attempted),
            ),
        ],
        (Some(outcome), None) => vec![
            Line::from(Span::styled("Some changes failed", theme::error_prompt())),
            label_value_line(
                "Applied",
                format!("{} of {}", outcome.applied(), outcome.attempted),
            ),
            label_value_line("Failed", plural(outcome.failed, "path", "paths")),
        ],
        (None, None) => vec![Line::from("Nothing was applied.")],
    };
    frame.render_widget(
        wrapped_paragraph(Text::from(lines)).block(theme::chrome("Done")),
        area,
    );
}
