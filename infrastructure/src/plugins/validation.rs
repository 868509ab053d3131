//! Descriptor validation

use super::builtin;
use avakin_domain::{Capability, EntryPoint, PluginDescriptor, PluginValidationError};
use semver::{Version, VersionReq};
use std::path::{Component, Path, PathBuf};

/// Check a descriptor against the host. Returns its parsed entry point.
pub fn validate_descriptor(
    descriptor: &PluginDescriptor,
    host: &Version,
) -> Result<EntryPoint, PluginValidationError> {
    let plugin = descriptor.name.trim();
    if plugin.is_empty() {
        return Err(PluginValidationError::EmptyName);
    }
    let plugin = plugin.to_string();

    Version::parse(descriptor.version.trim()).map_err(|_| PluginValidationError::InvalidVersion {
        plugin: plugin.clone(),
        version: descriptor.version.clone(),
    })?;

    if descriptor.capabilities.is_empty() {
        return Err(PluginValidationError::NoCapabilities { plugin });
    }

    let entry = descriptor.parsed_entry_point()?;

    for &capability in &descriptor.capabilities {
        let supported = match &entry {
            EntryPoint::Builtin(id) => {
                let caps = builtin::capabilities_of(id).ok_or_else(|| {
                    PluginValidationError::UnknownBuiltin {
                        plugin: plugin.clone(),
                        id: id.clone(),
                    }
                })?;
                caps.contains(&capability)
            }
            other => other.supports(capability),
        };
        if !supported {
            return Err(PluginValidationError::CapabilityMismatch {
                plugin,
                capability,
                entry_kind: entry.to_string(),
            });
        }
        check_section(descriptor, &plugin, capability, &entry)?;
    }

    if let EntryPoint::Prompt(file) = &entry {
        let path = prompt_path(&descriptor.source_dir, file).ok_or_else(|| {
            PluginValidationError::PromptOutsidePlugin {
                plugin: plugin.clone(),
                path: file.display().to_string(),
            }
        })?;
        if !path.is_file() {
            return Err(PluginValidationError::MissingPromptFile {
                plugin,
                path: path.display().to_string(),
            });
        }
    }

    if let Some(required) = &descriptor.host_version {
        let req = VersionReq::parse(required).map_err(|e| PluginValidationError::InvalidManifest {
            path: descriptor.source_dir.display().to_string(),
            reason: format!("host_version '{}': {}", required, e),
        })?;
        if !req.matches(host) {
            return Err(PluginValidationError::IncompatibleHost {
                plugin,
                required: required.clone(),
                host: host.to_string(),
            });
        }
    }

    Ok(entry)
}

/// `file` under `source_dir`, or `None` when it would resolve outside it.
///
/// Rejects absolute paths and `..` lexically, then compares canonical paths
/// so a symlink cannot point elsewhere either.
pub(crate) fn prompt_path(source_dir: &Path, file: &Path) -> Option<PathBuf> {
    let relative = file
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !relative {
        return None;
    }
    let path = source_dir.join(file);
    match (path.canonicalize(), source_dir.canonicalize()) {
        (Ok(resolved), Ok(root)) if !resolved.starts_with(&root) => None,
        _ => Some(path),
    }
}

fn check_section(
    descriptor: &PluginDescriptor,
    plugin: &str,
    capability: Capability,
    entry: &EntryPoint,
) -> Result<(), PluginValidationError> {
    let incomplete = |reason: &str| PluginValidationError::IncompleteSection {
        plugin: plugin.to_string(),
        capability,
        reason: reason.to_string(),
    };
    match capability {
        Capability::AgentRole => match &descriptor.agent_role {
            Some(section) if !section.name.trim().is_empty() => Ok(()),
            Some(_) => Err(incomplete("[agent_role] name is empty")),
            None => Err(incomplete("missing [agent_role] section")),
        },
        Capability::Tool if *entry == EntryPoint::Command => match &descriptor.tool {
            Some(section) if !section.command.is_empty() => Ok(()),
            _ => Err(incomplete("[tool] command must name a program")),
        },
        Capability::Ingester => match &descriptor.ingester {
            Some(section) if !section.extensions.is_empty() => Ok(()),
            _ => Err(incomplete("[ingester] extensions is empty")),
        },
        Capability::Tool => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avakin_domain::{AgentRoleSection, IngesterSection, ToolSection};

    fn host() -> Version {
        Version::new(0, 3, 0)
    }

    fn command_tool() -> PluginDescriptor {
        let mut d = PluginDescriptor::new("pytest", "1.2.0")
            .with_capability(Capability::Tool)
            .with_entry_point("command");
        d.tool = Some(ToolSection {
            command: vec!["pytest".into(), "-q".into()],
            timeout_secs: None,
        });
        d
    }

    #[test]
    fn test_valid_command_tool() {
        assert_eq!(
            validate_descriptor(&command_tool(), &host()),
            Ok(EntryPoint::Command)
        );
    }

    #[test]
    fn test_invalid_version_and_empty_name() {
        let mut d = command_tool();
        d.version = "one".into();
        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::InvalidVersion { .. })
        ));

        d.name = "  ".into();
        assert_eq!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::EmptyName)
        );
    }

    #[test]
    fn test_missing_entry_point() {
        let d = PluginDescriptor::new("x", "1.0.0").with_capability(Capability::Tool);
        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::MissingEntryPoint { .. })
        ));
    }

    #[test]
    fn test_capability_schema_is_enforced() {
        let mut d = command_tool().with_capability(Capability::Ingester);
        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::CapabilityMismatch { .. })
        ));

        d = command_tool();
        d.tool = Some(ToolSection::default());
        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::IncompleteSection { .. })
        ));

        let mut role = PluginDescriptor::new("sec", "1.0.0")
            .with_capability(Capability::AgentRole)
            .with_entry_point("builtin:security-reviewer");
        assert!(matches!(
            validate_descriptor(&role, &host()),
            Err(PluginValidationError::IncompleteSection { .. })
        ));
        role.agent_role = Some(AgentRoleSection {
            name: "security".into(),
            stage: None,
            temperature: None,
        });
        assert!(validate_descriptor(&role, &host()).is_ok());
    }

    #[test]
    fn test_unknown_builtin_and_builtin_capabilities() {
        let d = PluginDescriptor::new("x", "1.0.0")
            .with_capability(Capability::Tool)
            .with_entry_point("builtin:does-not-exist");
        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::UnknownBuiltin { .. })
        ));

        let mut d = PluginDescriptor::new("x", "1.0.0")
            .with_capability(Capability::Tool)
            .with_entry_point("builtin:text-ingester");
        d.ingester = Some(IngesterSection {
            extensions: vec!["proto".into()],
        });
        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::CapabilityMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = PluginDescriptor::new("role", "1.0.0")
            .with_capability(Capability::AgentRole)
            .with_entry_point("prompt:role.md")
            .with_source_dir(dir.path());
        d.agent_role = Some(AgentRoleSection {
            name: "docs".into(),
            stage: None,
            temperature: None,
        });

        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::MissingPromptFile { .. })
        ));

        std::fs::write(dir.path().join("role.md"), "You write docs.").unwrap();
        assert!(validate_descriptor(&d, &host()).is_ok());
    }

    #[test]
    fn test_prompt_path_must_stay_in_plugin_dir() {
        let root = tempfile::tempdir().unwrap();
        let plugin_dir = root.path().join("docs-role");
        std::fs::create_dir(&plugin_dir).unwrap();
        std::fs::write(root.path().join("secret.txt"), "api key").unwrap();
        let mut d = PluginDescriptor::new("role", "1.0.0")
            .with_capability(Capability::AgentRole)
            .with_entry_point("prompt:../secret.txt")
            .with_source_dir(&plugin_dir);
        d.agent_role = Some(AgentRoleSection {
            name: "docs".into(),
            stage: None,
            temperature: None,
        });

        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::PromptOutsidePlugin { .. })
        ));

        let absolute = root.path().join("secret.txt");
        d.entry_point = format!("prompt:{}", absolute.display());
        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::PromptOutsidePlugin { .. })
        ));

        assert!(prompt_path(&plugin_dir, Path::new("./prompts/role.md")).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_prompt_symlink_out_of_plugin_dir_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let plugin_dir = root.path().join("docs-role");
        std::fs::create_dir(&plugin_dir).unwrap();
        std::fs::write(root.path().join("secret.txt"), "api key").unwrap();
        std::os::unix::fs::symlink(root.path().join("secret.txt"), plugin_dir.join("role.md"))
            .unwrap();

        assert!(prompt_path(&plugin_dir, Path::new("role.md")).is_none());
    }

    #[test]
    fn test_host_version_requirement() {
        let mut d = command_tool();
        d.host_version = Some(">=0.2, <0.4".into());
        assert!(validate_descriptor(&d, &host()).is_ok());

        d.host_version = Some("^1.0".into());
        assert!(matches!(
            validate_descriptor(&d, &host()),
            Err(PluginValidationError::IncompatibleHost { .. })
        ));
    }
}
