//! `RoomChat`: terminal chat client library.
//!
//! The [`session::Session`] is the entry point: it owns the connection
//! state machine, the room registry, and the room-filtered message log.

pub mod app;
pub mod config;
pub mod connection;
pub mod log;
pub mod rooms;
pub mod session;
pub mod ui;
