//! Plugin discovery, validation and activation
//!
//! Each plugin is a directory holding a `plugin.toml` manifest. Activated
//! plugins are registered in [`PluginRegistry`] keyed by (capability, name);
//! the orchestrator only sees them through the capability traits.

mod builtin;
mod command_tool;
mod manager;
mod manifest;
mod prompt_role;
mod registry;
mod validation;

pub use command_tool::{CHANGED_FILES_ENV, CommandTool};
pub use manager::{ActivationReport, PluginListing, PluginManager, PluginStateFile};
pub use manifest::{MANIFEST_FILE, PluginDiscovery, parse_manifest};
pub use prompt_role::PromptRole;
pub use registry::{Contributions, PluginRegistry};
pub use validation::validate_descriptor;
