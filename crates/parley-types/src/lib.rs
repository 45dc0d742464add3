//! Shared types for the Parley scripted-interview server.

mod history;
mod scenario;
mod session;
mod ws;

pub use history::*;
pub use scenario::*;
pub use session::*;
pub use ws::*;
