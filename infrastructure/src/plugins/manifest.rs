//! `plugin.toml` manifests and directory discovery

use avakin_domain::{PluginDescriptor, PluginValidationError};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "plugin.toml";

/// Parse one manifest; `source_dir` is set to the manifest's directory
pub fn parse_manifest(path: &Path) -> Result<PluginDescriptor, PluginValidationError> {
    let invalid = |reason: String| PluginValidationError::InvalidManifest {
        path: path.display().to_string(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let mut descriptor: PluginDescriptor =
        toml::from_str(&text).map_err(|e| invalid(e.message().to_string()))?;
    descriptor.source_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(descriptor)
}

/// Plugin search roots. Each call to [`iter`](Self::iter) walks them afresh.
#[derive(Debug, Clone, Default)]
pub struct PluginDiscovery {
    roots: Vec<PathBuf>,
}

impl PluginDiscovery {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Candidates in root order, then directory-name order. A root is only
    /// read once the previous root is exhausted.
    pub fn iter(&self) -> DiscoveryIter<'_> {
        DiscoveryIter {
            roots: self.roots.iter(),
            pending: Vec::new(),
        }
    }
}

impl<'a> IntoIterator for &'a PluginDiscovery {
    type Item = Result<PluginDescriptor, PluginValidationError>;
    type IntoIter = DiscoveryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct DiscoveryIter<'a> {
    roots: std::slice::Iter<'a, PathBuf>,
    /// Manifests of the current root, reversed so `pop` yields in order
    pending: Vec<PathBuf>,
}

fn manifests_in(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut manifests: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path().join(MANIFEST_FILE))
        .filter(|manifest| manifest.is_file())
        .collect();
    manifests.sort();
    manifests.reverse();
    manifests
}

impl Iterator for DiscoveryIter<'_> {
    type Item = Result<PluginDescriptor, PluginValidationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(manifest) = self.pending.pop() {
                return Some(parse_manifest(&manifest));
            }
            self.pending = manifests_in(self.roots.next()?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avakin_domain::Capability;

    fn write_plugin(root: &Path, dir: &str, manifest: &str) -> PathBuf {
        let plugin_dir = root.join(dir);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join(MANIFEST_FILE), manifest).unwrap();
        plugin_dir
    }

    #[test]
    fn test_parse_manifest_sets_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = write_plugin(
            dir.path(),
            "security",
            r#"
name = "security-reviewer"
version = "1.0.0"
capabilities = ["agent-role"]
entry_point = "prompt:role.md"

[agent_role]
name = "security"
stage = "reviewing"
"#,
        );

        let descriptor = parse_manifest(&plugin_dir.join(MANIFEST_FILE)).unwrap();

        assert_eq!(descriptor.name, "security-reviewer");
        assert!(descriptor.has_capability(Capability::AgentRole));
        assert_eq!(descriptor.source_dir, plugin_dir);
        assert_eq!(descriptor.agent_role.unwrap().name, "security");
    }

    #[test]
    fn test_discovery_is_ordered_restartable_and_yields_broken_manifests() {
        let builtin = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        write_plugin(builtin.path(), "b", "name = \"b\"\nversion = \"0.1.0\"\n");
        write_plugin(builtin.path(), "a", "name = \"a\"\nversion = \"0.1.0\"\n");
        write_plugin(user.path(), "broken", "name = [");
        std::fs::create_dir_all(user.path().join("not-a-plugin")).unwrap();

        let discovery = PluginDiscovery::new(vec![
            builtin.path().to_path_buf(),
            user.path().to_path_buf(),
            user.path().join("missing"),
        ]);

        let names: Vec<String> = discovery
            .iter()
            .map(|c| c.map(|d| d.name).unwrap_or_else(|_| "<invalid>".to_string()))
            .collect();
        assert_eq!(names, vec!["a", "b", "<invalid>"]);
        assert_eq!(discovery.iter().count(), 3);

        let mut lazy = discovery.iter();
        assert_eq!(lazy.next().unwrap().unwrap().name, "a");
    }
}
