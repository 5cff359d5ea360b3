use backstop_app::VisibleRows;
use crossterm::event::{Event, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Margin, Rect};
use ratatui::style::Color;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState, Table, TableState,
};
use tui_input::Input;
use tui_input::backend::crossterm::EventHandler;

use crate::theme;

#[derive(Debug, Clone)]
pub(crate) struct PathTableRender<'a> {
    pub(crate) title: Line<'a>,
    pub(crate) empty_message: &'a str,
    pub(crate) color: Color,
}

/// Cursor and filter text for one list of paths. The rows themselves are
/// recomputed from the selection model on every frame.
#[derive(Debug, Default)]
pub(crate) struct PathTableState {
    cursor: usize,
    query: Input,
}

impl PathTableState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn filter(&self) -> &str {
        self.query.value()
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    /// Feeds a key to the filter input. The cursor goes back to the top
    /// whenever the filter text changes.
    pub(crate) fn on_filter_key(&mut self, key: KeyEvent) -> bool {
        let changed = self.query.handle_event(&Event::Key(key)).is_some();
        if changed {
            self.cursor = 0;
        }
        changed
    }

    pub(crate) fn reset(&mut self) {
        self.cursor = 0;
        self.query.reset();
    }

    pub(crate) fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub(crate) fn move_down(&mut self, len: usize) {
        if self.cursor + 1 < len {
            self.cursor += 1;
        }
    }

    /// Keeps the cursor on a row after the list shrank.
    pub(crate) fn clamp(&mut self, len: usize) {
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    pub(crate) fn render_filter(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        title: Line<'_>,
        show_cursor: bool,
    ) {
        let width = area.width.saturating_sub(2) as usize;
        let scroll = self.query.visual_scroll(width);
        let paragraph = Paragraph::new(self.query.value())
            .scroll((0, scroll as u16))
            .block(theme::chrome(title));
        frame.render_widget(paragraph, area);

        if !show_cursor || width == 0 {
            return;
        }

        let visual = self.query.visual_cursor();
        let relative = visual.saturating_sub(scroll).min(width.saturating_sub(1));
        frame.set_cursor_position((area.x + 1 + relative as u16, area.y + 1));
    }

    pub(crate) fn render_table(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        rows: &VisibleRows,
        render: PathTableRender<'_>,
    ) {
        let mut block = theme::chrome(render.title);
        if let Some(total) = rows.truncated {
            block = block.title_bottom(Line::from(Span::styled(
                format!(" showing {} of {total} matches ", rows.rows.len()),
                theme::secondary_text(),
            )));
        }

        if rows.rows.is_empty() {
            frame.render_widget(Paragraph::new(render.empty_message).block(block), area);
            return;
        }

        let header = Row::new(["", "Path"]).style(theme::table_header(render.color));
        let body = rows.rows.iter().map(|row| {
            let mark = if row.selected { "[x]" } else { "[ ]" };
            Row::new([mark.to_string(), row.path.clone()])
        });
        let table = Table::new(body, [Constraint::Length(3), Constraint::Min(10)])
            .header(header)
            .block(block)
            .row_highlight_style(theme::table_highlight(render.color))
            .highlight_symbol(">> ");

        let mut state = TableState::new();
        state.select(Some(self.cursor.min(rows.rows.len() - 1)));
        frame.render_stateful_widget(table, area, &mut state);

        let viewport = area.height.saturating_sub(3) as usize;
        let mut scrollbar_state = ScrollbarState::new(rows.rows.len())
            .position(self.cursor)
            .viewport_content_length(viewport);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(None)
                .end_symbol(None),
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}
