use backstop_app::{BatchSide, ScanStep};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders};

pub(crate) fn chrome<'a>(title: impl Into<Line<'a>>) -> Block<'a> {
    Block::default().borders(Borders::ALL).title(title)
}

pub(crate) fn key_block() -> Block<'static> {
    chrome("Keys")
}

pub(crate) fn side_color(side: BatchSide) -> Color {
    match side {
        BatchSide::Add => Color::Yellow,
        BatchSide::Remove => Color::Cyan,
    }
}

pub(crate) fn step_style(step: ScanStep) -> Style {
    let color = match step {
        ScanStep::Idle => Color::Gray,
        ScanStep::Scanning => Color::Blue,
        ScanStep::Result => Color::Green,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

pub(crate) fn table_header(color: Color) -> Style {
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

pub(crate) fn table_highlight(color: Color) -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(color)
        .add_modifier(Modifier::BOLD)
}

pub(crate) fn focus_prompt() -> Style {
    Style::default()
        .fg(Color::Blue)
        .add_modifier(Modifier::BOLD)
}

pub(crate) fn success_prompt() -> Style {
    Style::default()
        .fg(Color::Green)
        .add_modifier(Modifier::BOLD)
}

pub(crate) fn error_prompt() -> Style {
    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
}

pub(crate) fn secondary_text() -> Style {
    Style::default().fg(Color::Gray).add_modifier(Modifier::DIM)
}
