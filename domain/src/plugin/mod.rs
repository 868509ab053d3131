//! Plugin domain module
//!
//! Plugins extend the host only through the capability traits in
//! [`capability`]. The host never looks past those traits at concrete plugin
//! types.

pub mod capability;
pub mod descriptor;
pub mod error;

pub use capability::{
    AgentRoleProvider, Capability, IngesterProvider, ToolInvocation, ToolOutput, ToolProvider,
};
pub use descriptor::{
    AgentRoleSection, EntryPoint, IngesterSection, PluginDescriptor, PluginState, ToolSection,
};
pub use error::{PluginError, PluginValidationError};
