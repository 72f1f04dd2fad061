//! `RoomChat`: terminal chat client with server-managed rooms.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/roomchat/config.toml`).
//!
//! ```bash
//! # Connect to a local server, asking for a name on start
//! cargo run --bin roomchat
//!
//! # Skip the prompt and pick another server
//! cargo run --bin roomchat -- --server-url ws://chat.example.com:8765 --name alice
//! ```

use std::io;
use std::path::Path;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use roomchat::app::{Action, App};
use roomchat::config::{CliArgs, ClientConfig};
use roomchat::connection::Connector;
use roomchat::connection::ws::WsConnector;
use roomchat::session::{Session, SessionEvent};
use roomchat::ui;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: {e}; using defaults");
            ClientConfig::default()
        }
    };

    // Logs go to a file; ratatui owns stdout.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(server = %config.server_url, "roomchat starting");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &config).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    tracing::info!("roomchat exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("roomchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main application loop: draw, pump session events, handle one key.
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &ClientConfig,
) -> io::Result<()> {
    let mut app = App::new(config.timestamp_format.clone());
    let connector = WsConnector::new(config.connect_timeout);
    let (mut session, mut feed) = Session::new(connector, config.server_url.clone());

    if let Some(name) = &config.name
        && !session.set_identity(name)
    {
        app.notice = Some("name from config is empty; enter one".to_string());
    }

    loop {
        terminal.draw(|frame| ui::draw(frame, &app, &session))?;

        session.drain_events();
        drain_feed(&mut app, &mut feed, session.rooms());

        if event::poll(config.poll_timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.notice = None;
            let in_session = session.identity().is_some();
            if let Some(action) = app.handle_key_event(key, in_session, session.rooms()) {
                apply(&mut app, &mut session, action);
            }
        }

        if app.should_quit {
            session.end();
            if !session.wait_closed(config.shutdown_grace).await {
                tracing::warn!("connection did not finish closing before exit");
            }
            return Ok(());
        }
    }
}

/// Forward session changes to the front-end state.
fn drain_feed(app: &mut App, feed: &mut mpsc::UnboundedReceiver<SessionEvent>, rooms: &[String]) {
    while let Ok(event) = feed.try_recv() {
        app.observe(&event, rooms);
    }
}

/// Apply a user action to the session.
fn apply<C: Connector>(app: &mut App, session: &mut Session<C>, action: Action) {
    match action {
        Action::SetIdentity(name) => {
            if session.set_identity(&name) {
                app.clear_input();
            } else {
                app.notice = Some("name must not be empty".to_string());
            }
        }
        Action::SendMessage(text) => {
            if session.send_message(&text) {
                app.clear_input();
            } else if !session.state().is_open() {
                app.notice = Some(format!("not sent: connection is {}", session.state()));
            }
        }
        Action::JoinRoom(room) => {
            if session.join_room(&room) {
                app.clear_input();
            }
        }
        Action::CreateRoom(room) => {
            if session.create_room(&room) {
                app.clear_input();
            }
        }
        Action::Reconnect => {
            app.clear_input();
            if let Some(name) = session.identity().map(|i| i.name().to_string()) {
                session.end();
                session.set_identity(&name);
            }
        }
        Action::Quit => app.should_quit = true,
    }
}
