//! Sidebar rendering for the room list.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
};

use super::theme;
use crate::app::{App, PanelFocus};
use crate::connection::Connector;
use crate::session::Session;

/// Render the sidebar with the known rooms. The current room is marked,
/// and an optimistic room the server has not listed yet is dimmed.
pub fn render<C: Connector>(frame: &mut Frame, area: Rect, app: &App, session: &Session<C>) {
    let is_focused = app.focus == PanelFocus::Sidebar;
    let current = session.current_room();

    let mut items: Vec<ListItem> = session
        .rooms()
        .iter()
        .enumerate()
        .map(|(idx, room)| {
            let marker = if room == current { "● " } else { "  " };
            let line = Line::from(vec![Span::raw(marker), Span::raw(format!("# {room}"))]);
            let style = if idx == app.selected_room && is_focused {
                theme::selected()
            } else if room == current {
                theme::highlighted()
            } else {
                theme::normal()
            };
            ListItem::new(line).style(style)
        })
        .collect();

    if !session.rooms().iter().any(|r| r == current) {
        items.push(ListItem::new(Line::from(Span::styled(
            format!("● # {current}"),
            theme::dimmed(),
        ))));
    }

    let block = Block::default()
        .title(Span::styled("Rooms", theme::panel_title(theme::SIDEBAR_TITLE)))
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::highlighted()
        } else {
            theme::normal()
        });

    frame.render_widget(List::new(items).block(block), area);
}
