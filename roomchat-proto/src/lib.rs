//! Shared protocol definitions for the `RoomChat` wire format.
//!
//! Frames are JSON objects tagged by a `type` field and exchanged one per
//! WebSocket text message.

pub mod codec;
pub mod frame;
