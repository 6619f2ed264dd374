use std::path::{Path, PathBuf};
use std::sync::Arc;

use deliver_schema::{Package, PackageName, PackageOrigin, Requirement, Version};
use tracing::debug;

use super::{LoadScope, PackageSource, SourceKey};
use crate::definition::{DefinitionFile, write_definition};
use crate::error::{DeliverError, Result};

const MAKERS: [&str; 3] = ["arch", "os", "platform"];

/// Facts about the host that bind packages describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    /// Operating system family, e.g. `linux` or `osx`.
    pub platform: String,
    /// CPU architecture, e.g. `x86_64`.
    pub arch: String,
    /// Distribution and release, e.g. `ubuntu-22.04`.
    pub os: String,
}

impl HostFacts {
    /// Inspect the running host.
    pub fn detect() -> Self {
        let platform = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        }
        .to_string();
        let os = detect_os(&platform).unwrap_or_else(|| platform.clone());
        Self {
            platform,
            arch: std::env::consts::ARCH.to_string(),
            os,
        }
    }
}

fn detect_os(platform: &str) -> Option<String> {
    if platform != "linux" {
        return None;
    }
    let release = std::fs::read_to_string("/etc/os-release").ok()?;
    let field = |key: &str| {
        release.lines().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|value| value.trim_matches('"').to_string())
        })
    };
    let id = field("ID")?;
    let os = match field("VERSION_ID") {
        Some(version) => format!("{id}-{version}"),
        None => id,
    };
    Some(sanitize(&os))
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') { c } else { '_' })
        .collect()
}

/// Synthesizes `platform`, `arch` and `os` packages for the host.
///
/// Bind packages exist only in memory until deployed, at which point their
/// definition is written straight into the deploy path.
#[derive(Debug, Clone)]
pub struct BindSource {
    key: SourceKey,
    facts: HostFacts,
}

impl BindSource {
    /// Bind packages for the running host.
    pub fn detect() -> Self {
        Self::new(HostFacts::detect())
    }

    /// Bind packages describing `facts`.
    pub fn new(facts: HostFacts) -> Self {
        Self {
            key: SourceKey::Bind,
            facts,
        }
    }

    /// Build the package a maker produces, if `name` has a maker.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Config`] if a host fact is not a valid version.
    pub fn make(&self, name: &str) -> Result<Option<Package>> {
        let version = |fact: &str| {
            Version::parse(fact).map_err(|e| DeliverError::Config(format!("host {name} '{fact}': {e}")))
        };
        let package = match name {
            "platform" => Package::new(name, version(&self.facts.platform)?, PackageOrigin::Synthesized),
            "arch" => Package::new(name, version(&self.facts.arch)?, PackageOrigin::Synthesized),
            "os" => Package::new(name, version(&self.facts.os)?, PackageOrigin::Synthesized).with_requires(vec![
                Requirement::parse(&format!("platform-{}", self.facts.platform))?,
                Requirement::parse(&format!("arch-{}", self.facts.arch))?,
            ]),
            _ => return Ok(None),
        };
        Ok(Some(package))
    }

    /// Write the bind package `name` into `deploy_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` has no maker or the definition cannot be
    /// written.
    pub fn materialize(&self, name: &PackageName, deploy_path: &Path) -> Result<PathBuf> {
        let package = self
            .make(name)?
            .ok_or_else(|| DeliverError::Other(format!("no bind maker for '{name}'")))?;
        debug!("Binding {} into {}", package.qualified_name(), deploy_path.display());
        write_definition(deploy_path, &DefinitionFile::from_package(&package))
    }
}

impl PackageSource for BindSource {
    fn key(&self) -> &SourceKey {
        &self.key
    }

    fn family_names(&self) -> Result<Vec<PackageName>> {
        Ok(MAKERS.iter().map(|name| PackageName::new(name)).collect())
    }

    fn load(&self, family: &PackageName, _scope: &LoadScope<'_>) -> Result<Vec<Arc<Package>>> {
        Ok(self.make(family)?.map(Arc::new).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionLoader, TomlDefinitionLoader};
    use tempfile::tempdir;

    fn facts() -> HostFacts {
        HostFacts {
            platform: "linux".into(),
            arch: "x86_64".into(),
            os: "ubuntu-22.04".into(),
        }
    }

    #[test]
    fn test_os_requires_platform_and_arch() {
        let source = BindSource::new(facts());
        let os = source.make("os").unwrap().unwrap();
        assert_eq!(os.qualified_name(), "os-ubuntu-22.04");
        let requires: Vec<String> = os
            .requires
            .evaluate(&Default::default())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(requires, vec!["platform-linux", "arch-x86_64"]);
        assert!(os.is_synthesized());
    }

    #[test]
    fn test_unknown_family_is_empty() {
        let source = BindSource::new(facts());
        assert!(source.load(&PackageName::new("python"), &LoadScope::empty()).unwrap().is_empty());
        assert_eq!(source.family_names().unwrap().len(), 3);
    }

    #[test]
    fn test_materialize_writes_loadable_definition() {
        let tmp = tempdir().unwrap();
        let source = BindSource::new(facts());
        let path = source.materialize(&PackageName::new("arch"), tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join("arch/x86_64/package.toml"));

        let loaded = TomlDefinitionLoader
            .load_family(tmp.path(), &PackageName::new("arch"), &LoadScope::empty())
            .unwrap();
        assert_eq!(loaded[0].package.qualified_name(), "arch-x86_64");
    }

    #[test]
    fn test_sanitize_os_release_values() {
        assert_eq!(sanitize("rocky-9.3 (Blue Onyx)"), "rocky-9.3__Blue_Onyx_");
    }
}
