//! Core session management and scripted flow for Parley.

mod catalog;
mod error;
mod events;
mod flow;
mod grader;
mod matcher;
mod scenario;
mod session;
mod store;

pub use catalog::{CatalogEntry, ScenarioCatalog, default_entries, load_file};
pub use error::ParleyError;
pub use events::{SessionEvent, Turn};
pub use flow::{FlowEvent, FlowOutcome};
pub use grader::{CompiledTask, Grade, grade};
pub use matcher::{DEFAULT_BRANCH_FLAGS, Matcher, PredicateError};
pub use scenario::{CompiledScenario, FlowPointer, Strictness};
pub use session::{
    CANDIDATE_SENDER, CreateSessionOptions, CreatedSession, FOUNDER_SENDER, SessionManager,
};
pub use store::{SessionHandle, SessionStore, now_ms};

/// Result type for Parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
