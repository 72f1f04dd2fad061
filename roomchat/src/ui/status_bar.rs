//! Status bar rendering.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use super::theme;
use crate::app::{App, PanelFocus};
use crate::connection::{ConnectionState, Connector};
use crate::session::Session;

/// Render the status bar at the bottom of the screen.
pub fn render<C: Connector>(frame: &mut Frame, area: Rect, app: &App, session: &Session<C>) {
    let help_text = if session.identity().is_none() {
        "Enter: start | Esc: quit"
    } else {
        match app.focus {
            PanelFocus::Input => "Enter: send | Tab: switch panel | Esc: quit",
            PanelFocus::Sidebar => "↑↓/jk: navigate | Enter: join | Tab: switch panel",
            PanelFocus::Chat => "↑↓/jk: scroll | End: latest | Tab: switch panel",
        }
    };

    let state = session.state();
    let dot_color = match state {
        ConnectionState::Open => theme::SUCCESS,
        ConnectionState::Connecting | ConnectionState::Closing => theme::WARNING,
        ConnectionState::Closed {
            was_clean: false, ..
        } => theme::ERROR,
        ConnectionState::Disconnected | ConnectionState::Closed { .. } => theme::OFFLINE,
    };

    let mut spans = vec![
        Span::styled("RoomChat", theme::bold()),
        Span::raw(" | "),
        Span::styled("●", theme::normal().fg(dot_color)),
        Span::raw(format!(" {state}")),
    ];
    if let Some(identity) = session.identity() {
        spans.push(Span::raw(format!(
            " | {identity} in #{}",
            session.current_room()
        )));
    }
    spans.push(Span::raw(" | "));
    match &app.notice {
        Some(notice) => spans.push(Span::styled(notice.as_str(), theme::normal().fg(theme::WARNING))),
        None => spans.push(Span::styled(help_text, theme::dimmed())),
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(theme::status_bar_bg());
    frame.render_widget(paragraph, area);
}
