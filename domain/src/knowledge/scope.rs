//! Retrieval scopes

use crate::project::entities::ProjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Isolation boundary a chunk is stored under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Scope {
    Project(ProjectId),
    Global,
}

impl Scope {
    pub fn project(id: impl Into<ProjectId>) -> Self {
        Scope::Project(id.into())
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Project(id) => write!(f, "project:{}", id),
            Scope::Global => write!(f, "global"),
        }
    }
}

/// Which scopes a query consults.
///
/// A project query sees that project's store plus the global store unless
/// `include_global` is turned off. It never sees another project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScope {
    pub project: Option<ProjectId>,
    pub include_global: bool,
}

impl QueryScope {
    pub fn project(id: impl Into<ProjectId>) -> Self {
        Self {
            project: Some(id.into()),
            include_global: true,
        }
    }

    pub fn global_only() -> Self {
        Self {
            project: None,
            include_global: true,
        }
    }

    pub fn without_global(mut self) -> Self {
        self.include_global = false;
        self
    }

    /// Whether a chunk stored under `scope` is visible to this query
    pub fn admits(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Global => self.include_global,
            Scope::Project(id) => self.project.as_ref() == Some(id),
        }
    }

    /// The concrete scopes to search, project first
    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes = Vec::with_capacity(2);
        if let Some(id) = &self.project {
            scopes.push(Scope::Project(id.clone()));
        }
        if self.include_global {
            scopes.push(Scope::Global);
        }
        scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_query_admits_own_project_and_global() {
        let q = QueryScope::project("alpha");
        assert!(q.admits(&Scope::project("alpha")));
        assert!(q.admits(&Scope::Global));
        assert!(!q.admits(&Scope::project("beta")));
    }

    #[test]
    fn test_without_global() {
        let q = QueryScope::project("alpha").without_global();
        assert!(!q.admits(&Scope::Global));
        assert_eq!(q.scopes(), vec![Scope::project("alpha")]);
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::project("alpha").to_string(), "project:alpha");
        assert_eq!(Scope::Global.to_string(), "global");
    }
}
