//! Parley server library - HTTP/WebSocket surface for scripted interview sessions.
//!
//! Split from main.rs so the router can be driven from integration tests.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
pub mod sweeper;
pub mod websocket;
