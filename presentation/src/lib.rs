//! Presentation layer for avakin
//!
//! This crate contains CLI definitions, console formatters,
//! progress reporters, and the interactive Plan/Build REPL.

pub mod chat;
pub mod cli;
pub mod config;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use chat::AvakinRepl;
pub use cli::commands::{Cli, Command, KnowledgeTarget, ModelsAction, PluginsAction};
pub use config::ReplConfig;
pub use output::console::ConsoleFormatter;
pub use output::diff::{FileSnapshot, render_diff};
pub use progress::reporter::{ProgressReporter, SimpleProgress};
