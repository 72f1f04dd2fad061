//! Terminal UI rendering.

pub mod chat_panel;
pub mod sidebar;
pub mod status_bar;
pub mod theme;

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::app::App;
use crate::connection::Connector;
use crate::session::Session;

/// Main draw function for the entire UI.
pub fn draw<C: Connector>(frame: &mut Frame, app: &App, session: &Session<C>) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());

    let content_area = main_chunks[0];
    let status_area = main_chunks[1];

    if session.identity().is_none() {
        render_name_prompt(frame, content_area, app, session);
    } else {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(20), Constraint::Percentage(80)])
            .split(content_area);

        sidebar::render(frame, content_chunks[0], app, session);
        chat_panel::render(frame, content_chunks[1], app, session);
    }

    status_bar::render(frame, status_area, app, session);
}

/// Centered box asking for a display name.
fn render_name_prompt<C: Connector>(frame: &mut Frame, area: Rect, app: &App, session: &Session<C>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(5),
            Constraint::Min(0),
        ])
        .split(area);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(50),
            Constraint::Percentage(25),
        ])
        .split(rows[1]);

    let lines = vec![
        Line::from(Span::styled(
            format!("Server: {}", session.endpoint()),
            theme::dimmed(),
        )),
        Line::from(vec![
            Span::styled("Name: ", theme::bold()),
            Span::styled(chat_panel::with_cursor(app), theme::normal()),
        ]),
    ];

    let block = Block::default()
        .title(Span::styled(" RoomChat ", theme::panel_title(theme::CHAT_TITLE)))
        .borders(Borders::ALL)
        .border_style(theme::highlighted());

    frame.render_widget(
        Paragraph::new(lines).block(block).alignment(Alignment::Left),
        cols[1],
    );
}
