//! Feed import: row building and the run orchestrator.

pub mod builder;
pub mod orchestrator;

pub use builder::{build, parse_absolute_url, BuiltRow};
pub use orchestrator::{ImportOrchestrator, RunHistory, DEFAULT_HISTORY};
