//! `RoomChat` reference server library.
//!
//! Exposes the server for use in tests and embedding. Connections join
//! with a display name, move between rooms, and exchange chat lines that
//! are broadcast either to one room or to everyone. State is in memory
//! only.

pub mod config;
pub mod rooms;
pub mod server;
