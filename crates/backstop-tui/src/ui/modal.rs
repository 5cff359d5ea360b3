use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::Clear;

use crate::centered_rect;
use crate::theme;
use crate::ui::text::{key_hint_height, key_hint_paragraph, wrapped_paragraph};

pub(crate) struct ModalSpec<'a> {
    pub(crate) title: &'a str,
    pub(crate) title_style: Style,
    pub(crate) body: Text<'a>,
    pub(crate) key_hint: &'a str,
    pub(crate) width_pct: u16,
    pub(crate) height_pct: u16,
}

/// Draws a centered box with its key hints just outside it, or inside it
/// when the screen has no room above or below.
pub(crate) fn render_modal(frame: &mut Frame<'_>, spec: ModalSpec<'_>) {
    let area = centered_rect(spec.width_pct, spec.height_pct, frame.area());
    let title = Line::from(Span::styled(spec.title.to_string(), spec.title_style));
    let footer_height = key_hint_height(area.width, spec.key_hint);

    let (body_area, key_area) = match choose_key_area(frame.area(), area, footer_height) {
        Some(key_area) => (area, key_area),
        None => {
            let [body, key] = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(3), Constraint::Length(footer_height)])
                .areas(area);
            (body, key)
        }
    };

    frame.render_widget(Clear, body_area);
    frame.render_widget(
        wrapped_paragraph(spec.body).block(theme::chrome(title)),
        body_area,
    );
    frame.render_widget(Clear, key_area);
    frame.render_widget(
        key_hint_paragraph(spec.key_hint).block(theme::key_block()),
        key_area,
    );
}

fn choose_key_area(screen: Rect, body: Rect, footer_height: u16) -> Option<Rect> {
    let screen_bottom = screen.y.saturating_add(screen.height);
    let below_y = body.y.saturating_add(body.height);
    if below_y.saturating_add(footer_height) <= screen_bottom {
        return Some(Rect::new(body.x, below_y, body.width, footer_height));
    }

    let above_y = body.y.saturating_sub(footer_height);
    if above_y >= screen.y {
        return Some(Rect::new(body.x, above_y, body.width, footer_height));
    }

    None
}

pub(crate) fn render_error_modal(frame: &mut Frame<'_>, message: &str, footer: &str) {
    render_modal(
        frame,
        ModalSpec {
            title: "Error",
            title_style: theme::error_prompt(),
            body: text_from_message(message),
            key_hint: footer,
            width_pct: 80,
            height_pct: 50,
        },
    );
}

pub(crate) fn text_from_message(message: &str) -> Text<'static> {
    let base = message.trim_end();
    if base.is_empty() {
        return Text::from(Line::from(""));
    }
    Text::from(
        base.lines()
            .map(|line| Line::from(line.to_string()))
            .collect::<Vec<_>>(),
    )
}
