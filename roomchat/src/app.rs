//! Application state and key handling for the TUI.
//!
//! `App` only holds what the terminal front end needs (input line, focus,
//! scroll, sidebar selection). Chat state lives in the
//! [`Session`](crate::session::Session); key presses that affect it come out
//! of [`App::handle_key_event`] as an [`Action`] for the caller to apply.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::session::SessionEvent;

/// Which panel is currently focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelFocus {
    /// Input box is focused (default).
    Input,
    /// Sidebar room list is focused.
    Sidebar,
    /// Chat message list is focused.
    Chat,
}

/// A request for the session, produced by a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start a session with this display name.
    SetIdentity(String),
    /// Send a chat line to the current room.
    SendMessage(String),
    /// Switch to an existing room.
    JoinRoom(String),
    /// Create a room and switch to it.
    CreateRoom(String),
    /// End the session and start a new one with the same name.
    Reconnect,
    /// End the session and exit.
    Quit,
}

const HELP: &str = "/join <room>  /create <room>  /reconnect  /quit";

/// Terminal front-end state.
pub struct App {
    /// Current text input.
    pub input: String,
    /// Cursor position in input (character index).
    pub cursor_position: usize,
    /// Which panel is focused.
    pub focus: PanelFocus,
    /// How many lines the message list is scrolled back from the newest.
    pub scroll_back: usize,
    /// Selected index in the room list.
    pub selected_room: usize,
    /// One-line feedback shown in the status bar.
    pub notice: Option<String>,
    /// chrono format for message timestamps.
    pub timestamp_format: String,
    /// Whether the app should quit.
    pub should_quit: bool,
}

impl App {
    /// Create the front-end state.
    #[must_use]
    pub fn new(timestamp_format: impl Into<String>) -> Self {
        Self {
            input: String::new(),
            cursor_position: 0,
            focus: PanelFocus::Input,
            scroll_back: 0,
            selected_room: 0,
            notice: None,
            timestamp_format: timestamp_format.into(),
            should_quit: false,
        }
    }

    /// Handle a key event.
    ///
    /// `in_session` selects between the name prompt and the chat screen;
    /// `rooms` is the room list shown in the sidebar.
    pub fn handle_key_event(
        &mut self,
        key: KeyEvent,
        in_session: bool,
        rooms: &[String],
    ) -> Option<Action> {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => {
                return Some(Action::Quit);
            }
            (KeyCode::BackTab, _) if in_session => {
                self.cycle_focus_backward();
                return None;
            }
            (KeyCode::Tab, _) if in_session => {
                self.cycle_focus_forward();
                return None;
            }
            _ => {}
        }

        if !in_session {
            self.focus = PanelFocus::Input;
        }
        match self.focus {
            PanelFocus::Input => self.handle_input_key(key, in_session),
            PanelFocus::Sidebar => self.handle_sidebar_key(key, rooms),
            PanelFocus::Chat => {
                self.handle_chat_key(key);
                None
            }
        }
    }

    /// React to a session change.
    pub fn observe(&mut self, event: &SessionEvent, rooms: &[String]) {
        match event {
            SessionEvent::MessageAppended(_) | SessionEvent::LogCleared => self.scroll_back = 0,
            SessionEvent::RoomChanged(room) => {
                if let Some(idx) = rooms.iter().position(|r| r == room) {
                    self.selected_room = idx;
                }
            }
            SessionEvent::RoomsUpdated(list) => {
                self.selected_room = self.selected_room.min(list.len().saturating_sub(1));
            }
            SessionEvent::ConnectionChanged(_) => {}
        }
    }

    /// Clear the input line after the session accepted it.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Handle key event when input is focused.
    fn handle_input_key(&mut self, key: KeyEvent, in_session: bool) -> Option<Action> {
        match key.code {
            KeyCode::Enter => return self.submit(in_session),
            KeyCode::Char(c) => self.enter_char(c),
            KeyCode::Backspace => self.delete_char(),
            KeyCode::Left => self.move_cursor_left(),
            KeyCode::Right => self.move_cursor_right(),
            KeyCode::Home => self.cursor_position = 0,
            KeyCode::End => self.cursor_position = self.input.chars().count(),
            _ => {}
        }
        None
    }

    /// Handle key event when sidebar is focused.
    fn handle_sidebar_key(&mut self, key: KeyEvent, rooms: &[String]) -> Option<Action> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_room = self.selected_room.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected_room + 1 < rooms.len() {
                    self.selected_room += 1;
                }
            }
            KeyCode::Enter => {
                return rooms
                    .get(self.selected_room)
                    .map(|room| Action::JoinRoom(room.clone()));
            }
            _ => {}
        }
        None
    }

    /// Handle key event when chat is focused.
    const fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll_back += 1,
            KeyCode::Down | KeyCode::Char('j') => {
                self.scroll_back = self.scroll_back.saturating_sub(1);
            }
            KeyCode::End => self.scroll_back = 0,
            _ => {}
        }
    }

    /// Cycle focus forward: Input -> Sidebar -> Chat -> Input.
    const fn cycle_focus_forward(&mut self) {
        self.focus = match self.focus {
            PanelFocus::Input => PanelFocus::Sidebar,
            PanelFocus::Sidebar => PanelFocus::Chat,
            PanelFocus::Chat => PanelFocus::Input,
        };
    }

    /// Cycle focus backward: Input -> Chat -> Sidebar -> Input.
    const fn cycle_focus_backward(&mut self) {
        self.focus = match self.focus {
            PanelFocus::Input => PanelFocus::Chat,
            PanelFocus::Chat => PanelFocus::Sidebar,
            PanelFocus::Sidebar => PanelFocus::Input,
        };
    }

    /// Turn the input line into an action.
    fn submit(&mut self, in_session: bool) -> Option<Action> {
        if !in_session {
            return Some(Action::SetIdentity(self.input.clone()));
        }

        let Some(command) = self.input.strip_prefix('/') else {
            return Some(Action::SendMessage(self.input.clone()));
        };
        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(n, a)| (n, a.trim()));

        let action = match (name, arg) {
            ("join", room) if !room.is_empty() => Action::JoinRoom(room.to_string()),
            ("create", room) if !room.is_empty() => Action::CreateRoom(room.to_string()),
            ("reconnect", _) => Action::Reconnect,
            ("quit", _) => Action::Quit,
            ("join" | "create", _) => {
                self.notice = Some(format!("usage: /{name} <room>"));
                return None;
            }
            _ => {
                self.notice = Some(HELP.to_string());
                return None;
            }
        };
        Some(action)
    }

    /// Byte offset of the cursor in `input`.
    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    /// Insert a character at the cursor position.
    fn enter_char(&mut self, c: char) {
        let idx = self.byte_index();
        self.input.insert(idx, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let idx = self.byte_index();
            self.input.remove(idx);
        }
    }

    /// Move cursor left.
    const fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move cursor right.
    fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new("%H:%M")
    }
}
