//! Capability lookup port
//!
//! The orchestrator sees plugins only through this port: the active
//! implementations of each capability, plus role leases that keep a plugin
//! from being deactivated while a run uses its role.

use avakin_domain::{AgentRole, AgentRoleProvider, IngesterProvider, ToolProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub trait CapabilityRegistryPort: Send + Sync {
    fn agent_roles(&self) -> Vec<Arc<dyn AgentRoleProvider>>;

    fn tools(&self) -> Vec<Arc<dyn ToolProvider>>;

    fn ingesters(&self) -> Vec<Arc<dyn IngesterProvider>>;

    /// Mark `roles` as in use until the returned lease is dropped
    fn lease_roles(&self, roles: &[AgentRole]) -> RoleLease;

    /// Snapshot the plugin roles bound to a stage and lease them, together
    /// with `builtin`, as one step. A run uses only the returned providers.
    fn lease_stage_roles(
        &self,
        builtin: &[AgentRole],
    ) -> (Vec<Arc<dyn AgentRoleProvider>>, RoleLease) {
        let providers: Vec<Arc<dyn AgentRoleProvider>> = self
            .agent_roles()
            .into_iter()
            .filter(|p| p.stage().is_some())
            .collect();
        let lease = self.lease_roles(&lease_set(builtin, &providers));
        (providers, lease)
    }
}

/// `builtin` followed by the roles of `providers`
pub fn lease_set(builtin: &[AgentRole], providers: &[Arc<dyn AgentRoleProvider>]) -> Vec<AgentRole> {
    let mut roles = builtin.to_vec();
    roles.extend(providers.iter().map(|p| p.role()));
    roles
}

/// Shared in-use counters per role
#[derive(Clone, Default)]
pub struct RoleLeases {
    counts: Arc<Mutex<HashMap<AgentRole, usize>>>,
}

impl RoleLeases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, roles: &[AgentRole]) -> RoleLease {
        if let Ok(mut counts) = self.counts.lock() {
            for role in roles {
                *counts.entry(role.clone()).or_insert(0) += 1;
            }
        }
        RoleLease {
            counts: Arc::clone(&self.counts),
            roles: roles.to_vec(),
        }
    }

    pub fn is_leased(&self, role: &AgentRole) -> bool {
        self.counts
            .lock()
            .map(|counts| counts.get(role).copied().unwrap_or(0) > 0)
            .unwrap_or(false)
    }
}

/// Held by a run for its duration; releases its roles on drop
pub struct RoleLease {
    counts: Arc<Mutex<HashMap<AgentRole, usize>>>,
    roles: Vec<AgentRole>,
}

impl RoleLease {
    pub fn roles(&self) -> &[AgentRole] {
        &self.roles
    }
}

impl Drop for RoleLease {
    fn drop(&mut self) {
        if let Ok(mut counts) = self.counts.lock() {
            for role in &self.roles {
                if let Some(count) = counts.get_mut(role) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        counts.remove(role);
                    }
                }
            }
        }
    }
}

/// Registry with nothing active
#[derive(Default)]
pub struct NoCapabilities {
    leases: RoleLeases,
}

impl CapabilityRegistryPort for NoCapabilities {
    fn agent_roles(&self) -> Vec<Arc<dyn AgentRoleProvider>> {
        Vec::new()
    }

    fn tools(&self) -> Vec<Arc<dyn ToolProvider>> {
        Vec::new()
    }

    fn ingesters(&self) -> Vec<Arc<dyn IngesterProvider>> {
        Vec::new()
    }

    fn lease_roles(&self, roles: &[AgentRole]) -> RoleLease {
        self.leases.acquire(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_released_on_drop() {
        let leases = RoleLeases::new();
        let role = AgentRole::Custom("security-reviewer".to_string());
        {
            let _a = leases.acquire(std::slice::from_ref(&role));
            let b = leases.acquire(std::slice::from_ref(&role));
            assert!(leases.is_leased(&role));
            drop(b);
            assert!(leases.is_leased(&role));
        }
        assert!(!leases.is_leased(&role));
    }
}
