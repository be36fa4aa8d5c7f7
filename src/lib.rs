//! WebSocket relay for multiplayer card games.
//!
//! Players of one game connect to `/websocket`; whatever chat or game-state
//! message one of them sends is fanned out to every connection of that game.
//! The relay never interprets game state. It only tracks who is connected,
//! who is still answering pings, and which games never filled up, and it
//! forgets everything on restart.

pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
