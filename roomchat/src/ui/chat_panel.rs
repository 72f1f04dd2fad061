//! Chat panel rendering (message list + input box).

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use super::theme;
use crate::app::{App, PanelFocus};
use crate::connection::Connector;
use crate::log::{EntryKind, LogEntry};
use crate::session::Session;

/// Render the chat panel (messages + input box).
pub fn render<C: Connector>(frame: &mut Frame, area: Rect, app: &App, session: &Session<C>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    render_messages(frame, chunks[0], app, session);
    render_input(frame, chunks[1], app);
}

/// Render the message list, newest at the bottom.
fn render_messages<C: Connector>(frame: &mut Frame, area: Rect, app: &App, session: &Session<C>) {
    let is_focused = app.focus == PanelFocus::Chat;
    let me = session.identity().map(|i| i.name());

    let entries = session.log().entries();
    let end = entries.len().saturating_sub(app.scroll_back);
    let height = usize::from(area.height.saturating_sub(2));
    let start = end.saturating_sub(height);

    let items: Vec<ListItem> = entries[start..end]
        .iter()
        .map(|entry| ListItem::new(format_entry(entry, me, &app.timestamp_format)))
        .collect();

    let title = if app.scroll_back > 0 {
        format!("# {} (scrolled)", session.current_room())
    } else {
        format!("# {}", session.current_room())
    };
    let block = Block::default()
        .title(Span::styled(title, theme::panel_title(theme::CHAT_TITLE)))
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::highlighted()
        } else {
            theme::normal()
        });

    frame.render_widget(List::new(items).block(block), area);
}

/// Format one log entry as a display line.
fn format_entry<'a>(entry: &'a LogEntry, me: Option<&str>, timestamp_format: &str) -> Line<'a> {
    let stamp = entry.timestamp.clone().unwrap_or_else(|| {
        entry.received_at.format(timestamp_format).to_string()
    });
    let user = entry.user.as_deref().unwrap_or("?");

    let mut spans = vec![Span::styled(stamp, theme::timestamp()), Span::raw(" ")];
    match entry.kind {
        EntryKind::Chat => {
            let shown = if Some(user) == me { "You" } else { user };
            spans.push(Span::styled(
                shown.to_string(),
                theme::bold().fg(theme::sender_color(user)),
            ));
            spans.push(Span::raw(": "));
            spans.push(Span::styled(entry.text.as_str(), theme::normal()));
        }
        EntryKind::System => {
            spans.push(Span::styled(format!("* {}", entry.text), theme::system_message()));
        }
        EntryKind::Join => {
            spans.push(Span::styled(format!("→ {user} joined"), theme::system_message()));
        }
        EntryKind::Leave => {
            spans.push(Span::styled(format!("← {user} left"), theme::system_message()));
        }
    }
    Line::from(spans)
}

/// The input text with a block cursor at the cursor position.
#[must_use]
pub fn with_cursor(app: &App) -> String {
    let mut display: String = app.input.chars().take(app.cursor_position).collect();
    display.push('█');
    display.extend(app.input.chars().skip(app.cursor_position));
    display
}

/// Render the input box.
fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus == PanelFocus::Input;

    let input_line = if app.input.is_empty() && !is_focused {
        Line::from(Span::styled("Type a message or /help", theme::dimmed()))
    } else if is_focused {
        Line::from(Span::styled(with_cursor(app), theme::normal()))
    } else {
        Line::from(Span::styled(app.input.as_str(), theme::normal()))
    };

    let block = Block::default()
        .title("Input")
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::highlighted()
        } else {
            theme::normal()
        });

    frame.render_widget(Paragraph::new(input_line).block(block), area);
}
