//! Active capability implementations keyed by (capability, plugin name)

use avakin_application::{CapabilityRegistryPort, RoleLease, RoleLeases, lease_set};
use avakin_domain::{
    AgentRole, AgentRoleProvider, Capability, IngesterProvider, PluginError, ToolProvider,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// What one activated plugin contributes
#[derive(Default, Clone)]
pub struct Contributions {
    pub role: Option<Arc<dyn AgentRoleProvider>>,
    pub tool: Option<Arc<dyn ToolProvider>>,
    pub ingester: Option<Arc<dyn IngesterProvider>>,
}

impl Contributions {
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.role.is_some() {
            caps.push(Capability::AgentRole);
        }
        if self.tool.is_some() {
            caps.push(Capability::Tool);
        }
        if self.ingester.is_some() {
            caps.push(Capability::Ingester);
        }
        caps
    }
}

#[derive(Clone)]
enum Registered {
    Role(Arc<dyn AgentRoleProvider>),
    Tool(Arc<dyn ToolProvider>),
    Ingester(Arc<dyn IngesterProvider>),
}

/// Registry of active plugin implementations.
///
/// Lookups and leases take the read lock; unregistering takes the write
/// lock, so a role cannot be leased while its plugin is being removed.
#[derive(Default)]
pub struct PluginRegistry {
    entries: RwLock<BTreeMap<(Capability, String), Registered>>,
    leases: RoleLeases,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register everything `plugin` contributes, replacing earlier entries
    pub fn register(&self, plugin: &str, contributions: Contributions) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        if let Some(role) = contributions.role {
            entries.insert((Capability::AgentRole, plugin.to_string()), Registered::Role(role));
        }
        if let Some(tool) = contributions.tool {
            entries.insert((Capability::Tool, plugin.to_string()), Registered::Tool(tool));
        }
        if let Some(ingester) = contributions.ingester {
            entries.insert(
                (Capability::Ingester, plugin.to_string()),
                Registered::Ingester(ingester),
            );
        }
    }

    /// Remove every entry of `plugin`. Returns whether anything was removed;
    /// fails without removing anything if one of its roles is leased.
    pub fn unregister(&self, plugin: &str) -> Result<bool, PluginError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PluginError::Io("plugin registry lock poisoned".to_string()))?;

        if let Some(Registered::Role(role)) =
            entries.get(&(Capability::AgentRole, plugin.to_string()))
        {
            let role = role.role();
            if self.leases.is_leased(&role) {
                return Err(PluginError::InUse {
                    name: plugin.to_string(),
                    role: role.to_string(),
                });
            }
        }

        let before = entries.len();
        entries.retain(|(_, name), _| name != plugin);
        Ok(entries.len() != before)
    }

    pub fn is_registered(&self, capability: Capability, plugin: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(&(capability, plugin.to_string())))
            .unwrap_or(false)
    }

    /// (capability, plugin name) of every registered entry, sorted
    pub fn keys(&self) -> Vec<(Capability, String)> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_role_leased(&self, role: &AgentRole) -> bool {
        self.leases.is_leased(role)
    }

    fn collect<T>(&self, pick: impl Fn(&Registered) -> Option<T>) -> Vec<T> {
        self.entries
            .read()
            .map(|entries| entries.values().filter_map(pick).collect())
            .unwrap_or_default()
    }
}

impl CapabilityRegistryPort for PluginRegistry {
    fn agent_roles(&self) -> Vec<Arc<dyn AgentRoleProvider>> {
        self.collect(|r| match r {
            Registered::Role(role) => Some(Arc::clone(role)),
            _ => None,
        })
    }

    fn tools(&self) -> Vec<Arc<dyn ToolProvider>> {
        self.collect(|r| match r {
            Registered::Tool(tool) => Some(Arc::clone(tool)),
            _ => None,
        })
    }

    fn ingesters(&self) -> Vec<Arc<dyn IngesterProvider>> {
        self.collect(|r| match r {
            Registered::Ingester(ingester) => Some(Arc::clone(ingester)),
            _ => None,
        })
    }

    fn lease_roles(&self, roles: &[AgentRole]) -> RoleLease {
        // Hold the read lock so no unregister interleaves with the lease
        let _entries = self.entries.read();
        self.leases.acquire(roles)
    }

    fn lease_stage_roles(
        &self,
        builtin: &[AgentRole],
    ) -> (Vec<Arc<dyn AgentRoleProvider>>, RoleLease) {
        // One read guard covers the snapshot and the lease
        let Ok(entries) = self.entries.read() else {
            return (Vec::new(), self.leases.acquire(builtin));
        };
        let providers: Vec<Arc<dyn AgentRoleProvider>> = entries
            .values()
            .filter_map(|r| match r {
                Registered::Role(role) if role.stage().is_some() => Some(Arc::clone(role)),
                _ => None,
            })
            .collect();
        let lease = self.leases.acquire(&lease_set(builtin, &providers));
        (providers, lease)
    }
}
