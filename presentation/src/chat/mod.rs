//! Interactive session
//!
//! Provides a line-editor REPL that talks to the orchestrator in Plan mode
//! and starts Build-mode runs once a blueprint is approved.

mod repl;

pub use repl::AvakinRepl;
