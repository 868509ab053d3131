//! Infrastructure layer for avakin
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: model provider transports, the vector
//! knowledge store, plugin loading, the local workspace, configuration
//! file loading and the conversation log.

pub mod config;
pub mod knowledge;
pub mod logging;
pub mod plugins;
pub mod providers;
pub mod workspace;

// Re-export commonly used types
pub use config::{ConfigIssue, ConfigLoader, DEFAULT_MODEL, FileConfig, Severity};
pub use knowledge::{HashingEmbedder, OllamaEmbedder, VectorKnowledgeStore, embedder_from_config};
pub use logging::JsonlConversationLogger;
pub use plugins::{PluginDiscovery, PluginListing, PluginManager, PluginRegistry};
pub use providers::{RoutingTransport, default_adapters};
pub use workspace::{LocalWorkspace, STATE_DIR};
