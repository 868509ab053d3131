//! Plugin lifecycle: discovery, validation, dependency-ordered activation
//! and the persisted enable/disable state

use super::builtin;
use super::command_tool::CommandTool;
use super::manifest::PluginDiscovery;
use super::prompt_role::PromptRole;
use super::registry::{Contributions, PluginRegistry};
use super::validation::validate_descriptor;
use avakin_domain::{
    Capability, EntryPoint, PluginDescriptor, PluginError, PluginState, PluginValidationError,
};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Persisted plugin state. Plugins are enabled unless listed here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStateFile {
    #[serde(default)]
    pub disabled: BTreeSet<String>,
}

/// One row of `plugins list`
#[derive(Debug, Clone, PartialEq)]
pub struct PluginListing {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    pub source: PathBuf,
    pub state: PluginState,
}

/// Outcome of [`PluginManager::activate_all`]
#[derive(Debug, Default)]
pub struct ActivationReport {
    pub activated: Vec<String>,
    pub disabled: Vec<String>,
    pub invalid: Vec<PluginValidationError>,
    pub failed: Vec<(String, PluginError)>,
}

#[derive(Default)]
struct ManagerState {
    active: BTreeMap<String, PluginDescriptor>,
    failures: BTreeMap<String, String>,
}

pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    discovery: PluginDiscovery,
    state_path: PathBuf,
    host: Version,
    state: Mutex<ManagerState>,
}

impl PluginManager {
    pub fn new(
        registry: Arc<PluginRegistry>,
        discovery: PluginDiscovery,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            discovery,
            state_path: state_path.into(),
            host: host_version(),
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn with_host_version(mut self, host: Version) -> Self {
        self.host = host;
        self
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn discovery(&self) -> &PluginDiscovery {
        &self.discovery
    }

    /// Check a descriptor without activating it
    pub fn validate(&self, descriptor: &PluginDescriptor) -> Result<(), PluginValidationError> {
        validate_descriptor(descriptor, &self.host).map(|_| ())
    }

    /// Every discovered candidate with its state. Never fails: broken
    /// manifests and an unreadable state file show up in the listing.
    pub async fn list(&self) -> Vec<PluginListing> {
        let disabled = self.load_state().await.unwrap_or_default().disabled;
        let state = self.state.lock().await;
        let mut listings = Vec::new();

        for candidate in &self.discovery {
            let descriptor = match candidate {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    let name = match &e {
                        PluginValidationError::InvalidManifest { path, .. } => path.clone(),
                        _ => String::new(),
                    };
                    listings.push(PluginListing {
                        name,
                        version: String::new(),
                        capabilities: Vec::new(),
                        source: PathBuf::new(),
                        state: PluginState::Invalid(e.to_string()),
                    });
                    continue;
                }
            };

            let plugin_state = if state.active.contains_key(&descriptor.name) {
                PluginState::Active
            } else if disabled.contains(&descriptor.name) {
                PluginState::Disabled
            } else if let Err(e) = self.validate(&descriptor) {
                PluginState::Invalid(e.to_string())
            } else if let Some(reason) = state.failures.get(&descriptor.name) {
                PluginState::Failed(reason.clone())
            } else {
                PluginState::Failed("not activated".to_string())
            };

            listings.push(PluginListing {
                name: descriptor.name.clone(),
                version: descriptor.version.clone(),
                capabilities: descriptor.capabilities.clone(),
                source: descriptor.source_dir.clone(),
                state: plugin_state,
            });
        }
        listings
    }

    /// Validate, instantiate and register one plugin. Its dependencies must
    /// already be active.
    pub async fn activate(&self, descriptor: &PluginDescriptor) -> Result<(), PluginError> {
        let mut state = self.state.lock().await;
        let result = self.activate_locked(&mut state, descriptor);
        match &result {
            Ok(()) => {
                state.failures.remove(&descriptor.name);
            }
            Err(e) => {
                state
                    .failures
                    .insert(descriptor.name.clone(), e.to_string());
            }
        }
        result
    }

    fn activate_locked(
        &self,
        state: &mut ManagerState,
        descriptor: &PluginDescriptor,
    ) -> Result<(), PluginError> {
        let entry = validate_descriptor(descriptor, &self.host)?;

        if let Some(missing) = descriptor
            .dependencies
            .iter()
            .find(|dep| !state.active.contains_key(dep.as_str()))
        {
            return Err(PluginError::DependencyFailed {
                plugin: descriptor.name.clone(),
                dependency: missing.clone(),
            });
        }

        let contributions = instantiate(descriptor, entry)?;

        if state.active.contains_key(&descriptor.name) {
            self.registry.unregister(&descriptor.name)?;
        }
        self.registry.register(&descriptor.name, contributions);
        state
            .active
            .insert(descriptor.name.clone(), descriptor.clone());

        info!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            "Plugin activated"
        );
        Ok(())
    }

    /// Discover every candidate and activate the enabled ones in dependency
    /// order. One plugin failing never stops the others.
    pub async fn activate_all(&self) -> ActivationReport {
        let mut report = ActivationReport::default();
        let disabled = match self.load_state().await {
            Ok(file) => file.disabled,
            Err(e) => {
                warn!("Ignoring plugin state file: {}", e);
                BTreeSet::new()
            }
        };

        // Later roots override earlier ones, so a user plugin replaces a
        // built-in of the same name
        let mut candidates: BTreeMap<String, PluginDescriptor> = BTreeMap::new();
        for candidate in &self.discovery {
            match candidate {
                Ok(descriptor) if disabled.contains(&descriptor.name) => {
                    report.disabled.push(descriptor.name);
                }
                Ok(descriptor) => match self.validate(&descriptor) {
                    Ok(()) => {
                        if let Some(previous) = candidates.insert(descriptor.name.clone(), descriptor)
                        {
                            debug!(
                                plugin = %previous.name,
                                source = %previous.source_dir.display(),
                                "Plugin overridden"
                            );
                        }
                    }
                    Err(e) => {
                        warn!("Skipping invalid plugin: {}", e);
                        report.invalid.push(e);
                    }
                },
                Err(e) => {
                    warn!("Skipping invalid plugin: {}", e);
                    report.invalid.push(e);
                }
            }
        }

        let (order, cyclic) = activation_order(&candidates);

        for name in order {
            let Some(descriptor) = candidates.get(&name) else {
                continue;
            };
            match self.activate(descriptor).await {
                Ok(()) => report.activated.push(name),
                Err(e) => {
                    warn!(plugin = %name, "Plugin activation failed: {}", e);
                    report.failed.push((name, e));
                }
            }
        }

        for name in cyclic {
            let dependency = candidates
                .get(&name)
                .and_then(|d| d.dependencies.first().cloned())
                .unwrap_or_default();
            let error = PluginError::DependencyFailed {
                plugin: name.clone(),
                dependency,
            };
            warn!(plugin = %name, "Plugin activation failed: {}", error);
            self.state
                .lock()
                .await
                .failures
                .insert(name.clone(), error.to_string());
            report.failed.push((name, error));
        }

        report
    }

    /// Unregister a plugin. An unknown name is a no-op returning `false`.
    /// Fails with `InUse` while the active run holds one of its roles.
    pub async fn deactivate(&self, name: &str) -> Result<bool, PluginError> {
        let mut state = self.state.lock().await;
        if !state.active.contains_key(name) {
            return Ok(false);
        }

        let dependents: Vec<String> = state
            .active
            .values()
            .filter(|d| d.dependencies.iter().any(|dep| dep == name))
            .map(|d| d.name.clone())
            .collect();
        if let Some(dependent) = dependents.first() {
            return Err(PluginError::Activation {
                plugin: name.to_string(),
                reason: format!("'{}' depends on it", dependent),
            });
        }

        self.registry.unregister(name)?;
        state.active.remove(name);
        info!(plugin = %name, "Plugin deactivated");
        Ok(true)
    }

    /// Names of active plugins, sorted
    pub async fn active(&self) -> Vec<String> {
        self.state.lock().await.active.keys().cloned().collect()
    }

    /// Persist the enabled flag. Takes effect on the next `activate_all`;
    /// disabling an active plugin also deactivates it now.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), PluginError> {
        let mut file = self.load_state().await?;
        let changed = if enabled {
            file.disabled.remove(name)
        } else {
            file.disabled.insert(name.to_string())
        };
        if changed {
            self.save_state(&file).await?;
        }
        if !enabled {
            self.deactivate(name).await?;
        }
        Ok(())
    }

    pub async fn is_enabled(&self, name: &str) -> bool {
        self.load_state()
            .await
            .map(|file| !file.disabled.contains(name))
            .unwrap_or(true)
    }

    async fn load_state(&self) -> Result<PluginStateFile, PluginError> {
        if !fs::try_exists(&self.state_path).await.unwrap_or(false) {
            return Ok(PluginStateFile::default());
        }
        let raw = fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| io_error(&self.state_path, e))?;
        if raw.trim().is_empty() {
            return Ok(PluginStateFile::default());
        }
        serde_json::from_str(&raw).map_err(|e| io_error(&self.state_path, e))
    }

    async fn save_state(&self, file: &PluginStateFile) -> Result<(), PluginError> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        let json = serde_json::to_string_pretty(file).map_err(|e| io_error(&self.state_path, e))?;
        let tmp = self.state_path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &self.state_path)
            .await
            .map_err(|e| io_error(&self.state_path, e))
    }
}

fn host_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0))
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> PluginError {
    PluginError::Io(format!("{}: {}", path.display(), e))
}

fn instantiate(
    descriptor: &PluginDescriptor,
    entry: EntryPoint,
) -> Result<Contributions, PluginError> {
    match entry {
        EntryPoint::Builtin(id) => builtin::instantiate(&id, descriptor),
        EntryPoint::Prompt(file) => Ok(Contributions {
            role: Some(Arc::new(PromptRole::load(descriptor, &file)?)),
            ..Default::default()
        }),
        EntryPoint::Command => Ok(Contributions {
            tool: Some(Arc::new(CommandTool::from_descriptor(descriptor)?)),
            ..Default::default()
        }),
    }
}

/// Kahn's algorithm over the candidates, ties broken by name. Dependencies
/// outside the candidate set do not hold a plugin back; activation reports
/// them. Returns the order and the names stuck in a cycle.
fn activation_order(candidates: &BTreeMap<String, PluginDescriptor>) -> (Vec<String>, Vec<String>) {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (name, descriptor) in candidates {
        let deps: BTreeSet<&str> = descriptor
            .dependencies
            .iter()
            .map(String::as_str)
            .filter(|dep| candidates.contains_key(*dep))
            .collect();
        indegree.insert(name.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(name.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(candidates.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for &dependent in dependents.get(name).into_iter().flatten() {
            if let Some(n) = indegree.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    let cyclic = indegree
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(name, _)| name.to_string())
        .collect();
    (order, cyclic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::manifest::MANIFEST_FILE;
    use avakin_application::CapabilityRegistryPort;
    use avakin_domain::AgentRole;

    fn write_plugin(root: &Path, dir: &str, manifest: &str) -> PathBuf {
        let plugin_dir = root.join(dir);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join(MANIFEST_FILE), manifest).unwrap();
        plugin_dir
    }

    fn prompt_plugin(root: &Path, name: &str, deps: &[&str]) {
        let deps = deps
            .iter()
            .map(|d| format!("\"{}\"", d))
            .collect::<Vec<_>>()
            .join(", ");
        let dir = write_plugin(
            root,
            name,
            &format!(
                r#"
name = "{name}"
version = "1.0.0"
capabilities = ["agent-role"]
entry_point = "prompt:role.md"
dependencies = [{deps}]

[agent_role]
name = "{name}-role"
stage = "reviewing"
"#
            ),
        );
        std::fs::write(dir.join("role.md"), format!("You are {}.", name)).unwrap();
    }

    fn manager(root: &Path) -> PluginManager {
        PluginManager::new(
            Arc::new(PluginRegistry::new()),
            PluginDiscovery::new(vec![root.join("plugins")]),
            root.join("plugins.json"),
        )
        .with_host_version(Version::new(0, 1, 0))
    }

    #[test]
    fn test_activation_order_is_topological() {
        let mut candidates = BTreeMap::new();
        for (name, deps) in [("app", vec!["lib"]), ("lib", vec!["base"]), ("base", vec![])] {
            let mut descriptor = PluginDescriptor::new(name, "1.0.0");
            for dep in deps {
                descriptor = descriptor.with_dependency(dep);
            }
            candidates.insert(name.to_string(), descriptor);
        }
        candidates.insert(
            "x".into(),
            PluginDescriptor::new("x", "1.0.0").with_dependency("y"),
        );
        candidates.insert(
            "y".into(),
            PluginDescriptor::new("y", "1.0.0").with_dependency("x"),
        );

        let (order, cyclic) = activation_order(&candidates);

        assert_eq!(order, vec!["base", "lib", "app"]);
        assert_eq!(cyclic, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_activate_all_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        prompt_plugin(&plugins, "base", &[]);
        prompt_plugin(&plugins, "child", &["base"]);
        prompt_plugin(&plugins, "orphan", &["missing"]);
        write_plugin(&plugins, "broken", "name = [");

        let manager = manager(dir.path());
        let report = manager.activate_all().await;

        assert_eq!(report.activated, vec!["base", "child"]);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            &report.failed[0].1,
            PluginError::DependencyFailed { dependency, .. } if dependency == "missing"
        ));
        assert_eq!(manager.registry().agent_roles().len(), 2);
    }

    #[tokio::test]
    async fn test_list_reports_every_state() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        prompt_plugin(&plugins, "active", &[]);
        prompt_plugin(&plugins, "off", &[]);
        write_plugin(
            &plugins,
            "bad",
            "name = \"bad\"\nversion = \"1.0.0\"\ncapabilities = [\"tool\"]\n",
        );

        let manager = manager(dir.path());
        manager.set_enabled("off", false).await.unwrap();
        manager.activate_all().await;

        let listing = manager.list().await;
        let state_of = |name: &str| {
            listing
                .iter()
                .find(|l| l.name == name)
                .map(|l| l.state.clone())
                .unwrap()
        };
        assert_eq!(state_of("active"), PluginState::Active);
        assert_eq!(state_of("off"), PluginState::Disabled);
        assert!(matches!(state_of("bad"), PluginState::Invalid(_)));
    }

    #[tokio::test]
    async fn test_enabled_state_persists() {
        let dir = tempfile::tempdir().unwrap();
        let first = manager(dir.path());
        assert!(first.is_enabled("sec").await);

        first.set_enabled("sec", false).await.unwrap();
        let second = manager(dir.path());
        assert!(!second.is_enabled("sec").await);

        second.set_enabled("sec", true).await.unwrap();
        assert!(manager(dir.path()).is_enabled("sec").await);
    }

    #[tokio::test]
    async fn test_deactivate_unknown_is_noop_and_leased_role_blocks() {
        let dir = tempfile::tempdir().unwrap();
        prompt_plugin(&dir.path().join("plugins"), "sec", &[]);
        let manager = manager(dir.path());
        manager.activate_all().await;

        assert_eq!(manager.deactivate("nope").await, Ok(false));

        let lease = manager
            .registry()
            .lease_roles(&[AgentRole::Custom("sec-role".into())]);
        assert!(matches!(
            manager.deactivate("sec").await,
            Err(PluginError::InUse { .. })
        ));
        assert_eq!(manager.active().await, vec!["sec"]);

        drop(lease);
        assert_eq!(manager.deactivate("sec").await, Ok(true));
        assert!(manager.registry().agent_roles().is_empty());
    }

    #[tokio::test]
    async fn test_activate_requires_active_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        prompt_plugin(&plugins, "child", &["base"]);
        let manager = manager(dir.path());
        let descriptor = manager.discovery().iter().next().unwrap().unwrap();

        let err = manager.activate(&descriptor).await.unwrap_err();

        assert_eq!(
            err,
            PluginError::DependencyFailed {
                plugin: "child".into(),
                dependency: "base".into(),
            }
        );
        assert!(matches!(
            manager.list().await[0].state,
            PluginState::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_entry_point_leaves_active_plugins_alone() {
        let dir = tempfile::tempdir().unwrap();
        prompt_plugin(&dir.path().join("plugins"), "sec", &[]);
        let manager = manager(dir.path());
        manager.activate_all().await;
        assert_eq!(manager.active().await, vec!["sec"]);

        let mut other = PluginDescriptor::new("lint", "1.0.0").with_capability(Capability::Tool);
        other.entry_point = String::new();
        assert!(matches!(
            manager.activate(&other).await,
            Err(PluginError::Validation(
                PluginValidationError::MissingEntryPoint { plugin }
            )) if plugin == "lint"
        ));

        // Re-activating the live plugin without an entry point keeps the old one
        let mut replacement = manager.discovery().iter().next().unwrap().unwrap();
        replacement.entry_point = "  ".into();
        assert!(matches!(
            manager.activate(&replacement).await,
            Err(PluginError::Validation(
                PluginValidationError::MissingEntryPoint { .. }
            ))
        ));

        assert_eq!(manager.active().await, vec!["sec"]);
        assert!(manager.registry().is_registered(Capability::AgentRole, "sec"));
        assert_eq!(
            manager.registry().agent_roles()[0].role(),
            AgentRole::Custom("sec-role".into())
        );
    }
}
