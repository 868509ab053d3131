//! Plugin errors

use super::capability::Capability;
use thiserror::Error;

/// Why a plugin candidate was rejected. Never fatal to the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginValidationError {
    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Plugin has no name")]
    EmptyName,

    #[error("Plugin '{plugin}' has no entry point")]
    MissingEntryPoint { plugin: String },

    #[error("Plugin '{plugin}' has an unknown entry point '{entry_point}'")]
    UnknownEntryPoint { plugin: String, entry_point: String },

    #[error("Plugin '{plugin}' refers to unknown built-in '{id}'")]
    UnknownBuiltin { plugin: String, id: String },

    #[error("Plugin '{plugin}' prompt file not found: {path}")]
    MissingPromptFile { plugin: String, path: String },

    #[error("Plugin '{plugin}' prompt file escapes the plugin directory: {path}")]
    PromptOutsidePlugin { plugin: String, path: String },

    #[error("Plugin '{plugin}' declares no capabilities")]
    NoCapabilities { plugin: String },

    #[error("Plugin '{plugin}': a {entry_kind} entry point cannot provide '{capability}'")]
    CapabilityMismatch {
        plugin: String,
        capability: Capability,
        entry_kind: String,
    },

    #[error("Plugin '{plugin}' declares '{capability}' but its section is incomplete: {reason}")]
    IncompleteSection {
        plugin: String,
        capability: Capability,
        reason: String,
    },

    #[error("Plugin '{plugin}' has an invalid version '{version}'")]
    InvalidVersion { plugin: String, version: String },

    #[error("Plugin '{plugin}' requires host {required}, this host is {host}")]
    IncompatibleHost {
        plugin: String,
        required: String,
        host: String,
    },
}

/// Plugin runtime errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error(transparent)]
    Validation(#[from] PluginValidationError),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin '{name}' provides role '{role}' which is used by the active run")]
    InUse { name: String, role: String },

    #[error("Plugin '{plugin}' depends on '{dependency}' which is unavailable")]
    DependencyFailed { plugin: String, dependency: String },

    #[error("Plugin '{plugin}' failed to activate: {reason}")]
    Activation { plugin: String, reason: String },

    #[error("Plugin '{plugin}' failed: {reason}")]
    Execution { plugin: String, reason: String },

    #[error("Plugin state I/O error: {0}")]
    Io(String),
}
