//! Package definition files.
//!
//! Definitions are TOML files named `package.toml`, laid out as
//! `<root>/<family>/<version>/package.toml` or, for tag-driven and unversioned
//! packages, `<root>/<family>/package.toml`.
//!
//! ```toml
//! [package]
//! name = "foo"
//! version = "1.2"
//! requires = ["bar-1+"]
//! build_requires = ["cmake"]
//! variants = [["python-2"], ["python-3"]]
//!
//! # Replaces fields while the package is being built.
//! [building]
//! requires = ["bar-1+", "bar_devel"]
//!
//! # Replaces fields while building variant 1 only.
//! [building.variant.1]
//! private_build_requires = ["legacy_headers"]
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use deliver_schema::{
    BuildContext, Conditional, Package, PackageName, PackageOrigin, Requirement, Version,
};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use walkdir::WalkDir;

use crate::error::{DeliverError, Result};
use crate::source::LoadScope;

/// File name of a package definition.
pub const DEFINITION_FILE: &str = "package.toml";

/// A package as read from a definition, before source-specific expansion.
#[derive(Debug, Clone)]
pub struct PackageDefinition {
    /// Directory holding the definition file.
    pub directory: PathBuf,
    /// The package. Its origin is [`PackageOrigin::Developer`] at `directory`.
    pub package: Package,
    /// Remote repository whose tags supply additional versions.
    pub git_url: Option<String>,
}

/// Reads package definitions below a root directory.
pub trait DefinitionLoader {
    /// Family names with at least one definition directory below `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` exists but cannot be listed.
    fn family_names(&self, root: &Path) -> Result<Vec<PackageName>>;

    /// Every definition of `family` below `root`.
    ///
    /// Wildcard ranges in requirements are expanded against `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Definition`] for unreadable or malformed files.
    fn load_family(
        &self,
        root: &Path,
        family: &PackageName,
        scope: &LoadScope<'_>,
    ) -> Result<Vec<PackageDefinition>>;
}

/// The `[package]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Family name.
    pub name: String,
    /// Version; empty for unversioned packages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Runtime requirements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    /// Build requirements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_requires: Vec<String>,
    /// Private build requirements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_build_requires: Vec<String>,
    /// Variant requirement lists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Vec<String>>,
    /// Remote repository whose tags supply versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
}

/// Field overrides for one variant while building.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOverrides {
    /// Replaces `requires`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<String>>,
    /// Replaces `build_requires`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_requires: Option<Vec<String>>,
    /// Replaces `private_build_requires`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_build_requires: Option<Vec<String>>,
}

/// The `[building]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingOverrides {
    /// Replaces `requires`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<String>>,
    /// Replaces `build_requires`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_requires: Option<Vec<String>>,
    /// Replaces `private_build_requires`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_build_requires: Option<Vec<String>>,
    /// Replaces `variants`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<Vec<String>>>,
    /// Per-variant overrides keyed by variant index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variant: BTreeMap<String, VariantOverrides>,
}

/// A whole `package.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionFile {
    /// The `[package]` table.
    pub package: PackageInfo,
    /// The optional `[building]` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<BuildingOverrides>,
}

impl DefinitionFile {
    /// Parse a definition from a file.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Definition`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| DeliverError::definition(path, e))?;
        toml::from_str(&content).map_err(|e| DeliverError::definition(path, e))
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot be represented as TOML.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Describe a package by its runtime attributes.
    ///
    /// Conditional fields are evaluated in the runtime context; the result
    /// carries no `[building]` table.
    pub fn from_package(package: &Package) -> Self {
        let context = BuildContext::runtime();
        let strings =
            |reqs: Vec<Requirement>| -> Vec<String> { reqs.iter().map(ToString::to_string).collect() };
        Self {
            package: PackageInfo {
                name: package.name.to_string(),
                version: package.version.to_string(),
                requires: strings(package.requires.evaluate(&context)),
                build_requires: strings(package.build_requires.evaluate(&context)),
                private_build_requires: strings(package.private_build_requires.evaluate(&context)),
                variants: package
                    .variants
                    .evaluate(&context)
                    .into_iter()
                    .map(strings)
                    .collect(),
                git_url: None,
            },
            building: None,
        }
    }

    /// Turn the file into a package definition rooted at `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Definition`] naming `file` for invalid names,
    /// versions, requirements or variant indices.
    pub fn into_definition(
        self,
        directory: &Path,
        file: &Path,
        scope: &LoadScope<'_>,
    ) -> Result<PackageDefinition> {
        let info = self.package;
        if !PackageName::is_valid(&info.name) {
            return Err(DeliverError::definition(file, format!("invalid package name '{}'", info.name)));
        }
        let version = Version::parse(&info.version).map_err(|e| DeliverError::definition(file, e))?;

        let building = self.building.unwrap_or_default();
        let mut per_variant: BTreeMap<usize, VariantOverrides> = BTreeMap::new();
        for (key, overrides) in building.variant {
            let index = key.parse::<usize>().map_err(|_| {
                DeliverError::definition(file, format!("invalid variant index '{key}' in [building.variant]"))
            })?;
            per_variant.insert(index, overrides);
        }

        let field = |base: &[String],
                     overridden: Option<&Vec<String>>,
                     select: fn(&VariantOverrides) -> Option<&Vec<String>>|
         -> Result<Conditional<Vec<Requirement>>> {
            let base = parse_requirements(base, file, scope)?;
            let overridden = overridden
                .map(|items| parse_requirements(items, file, scope))
                .transpose()?;
            let mut by_index = BTreeMap::new();
            for (index, overrides) in &per_variant {
                if let Some(items) = select(overrides) {
                    by_index.insert(*index, parse_requirements(items, file, scope)?);
                }
            }
            Ok(conditional(base, overridden, by_index))
        };

        let mut package = Package::new(
            info.name.as_str(),
            version,
            PackageOrigin::Developer(directory.to_path_buf()),
        );
        package.requires = field(&info.requires, building.requires.as_ref(), |o| o.requires.as_ref())?;
        package.build_requires = field(
            &info.build_requires,
            building.build_requires.as_ref(),
            |o| o.build_requires.as_ref(),
        )?;
        package.private_build_requires = field(
            &info.private_build_requires,
            building.private_build_requires.as_ref(),
            |o| o.private_build_requires.as_ref(),
        )?;

        let variants = parse_variant_lists(&info.variants, file, scope)?;
        package.variants = match building.variants {
            None => Conditional::Fixed(variants),
            Some(overridden) => {
                let overridden = parse_variant_lists(&overridden, file, scope)?;
                Conditional::evaluated(move |ctx: &BuildContext| {
                    if ctx.building { overridden.clone() } else { variants.clone() }
                })
            }
        };

        Ok(PackageDefinition {
            directory: directory.to_path_buf(),
            package,
            git_url: info.git_url,
        })
    }
}

fn parse_requirements(items: &[String], file: &Path, scope: &LoadScope<'_>) -> Result<Vec<Requirement>> {
    items
        .iter()
        .map(|item| {
            Requirement::parse(item)
                .map(|req| scope.expand(req))
                .map_err(|e| DeliverError::definition(file, e))
        })
        .collect()
}

fn parse_variant_lists(
    lists: &[Vec<String>],
    file: &Path,
    scope: &LoadScope<'_>,
) -> Result<Vec<Vec<Requirement>>> {
    lists
        .iter()
        .map(|items| parse_requirements(items, file, scope))
        .collect()
}

fn conditional(
    base: Vec<Requirement>,
    building: Option<Vec<Requirement>>,
    per_variant: BTreeMap<usize, Vec<Requirement>>,
) -> Conditional<Vec<Requirement>> {
    if building.is_none() && per_variant.is_empty() {
        return Conditional::Fixed(base);
    }
    Conditional::evaluated(move |ctx: &BuildContext| {
        if !ctx.building {
            return base.clone();
        }
        if let Some(list) = ctx.variant_index.and_then(|i| per_variant.get(&i)) {
            return list.clone();
        }
        building.clone().unwrap_or_else(|| base.clone())
    })
}

/// Write `file` below `root` in the standard layout and return its path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
pub fn write_definition(root: &Path, file: &DefinitionFile) -> Result<PathBuf> {
    let mut directory = root.join(&file.package.name);
    if !file.package.version.is_empty() {
        directory.push(&file.package.version);
    }
    std::fs::create_dir_all(&directory)?;

    let path = directory.join(DEFINITION_FILE);
    let content = file.to_toml().map_err(|e| DeliverError::definition(&path, e))?;
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Reads `package.toml` files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlDefinitionLoader;

impl DefinitionLoader for TomlDefinitionLoader {
    fn family_names(&self, root: &Path) -> Result<Vec<PackageName>> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if PackageName::is_valid(&name) {
                names.push(PackageName::from(name));
            }
        }
        names.sort();
        Ok(names)
    }

    fn load_family(
        &self,
        root: &Path,
        family: &PackageName,
        scope: &LoadScope<'_>,
    ) -> Result<Vec<PackageDefinition>> {
        let family_dir = root.join(family);
        if !family_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut definitions = Vec::new();
        for entry in WalkDir::new(&family_dir)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if entry.file_name() != DEFINITION_FILE || !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(directory) = path.parent() else {
                continue;
            };
            trace!("Reading {}", path.display());

            let file = DefinitionFile::from_file(path)?;
            if file.package.name != family.as_str() {
                warn!(
                    "Skipping {}: declares package '{}' inside family '{family}'",
                    path.display(),
                    file.package.name
                );
                continue;
            }
            definitions.push(file.into_definition(directory, path, scope)?);
        }
        Ok(definitions)
    }
}

/// Holds definitions in memory, keyed by root.
///
/// Useful for embedding and tests; definitions can be added after the loader
/// has been handed to a source.
#[derive(Debug, Default)]
pub struct MemoryDefinitionLoader {
    roots: RefCell<BTreeMap<PathBuf, BTreeMap<PackageName, Vec<PackageDefinition>>>>,
}

impl MemoryDefinitionLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package under `root`.
    pub fn add(&self, root: impl AsRef<Path>, package: Package) {
        self.add_definition(root, package, None);
    }

    /// Add a package under `root` with an optional tag source.
    pub fn add_definition(&self, root: impl AsRef<Path>, mut package: Package, git_url: Option<String>) {
        let root = root.as_ref();
        let mut directory = root.join(&package.name);
        if !package.version.is_empty() {
            directory.push(package.version.as_str());
        }
        package.origin = PackageOrigin::Developer(directory.clone());
        self.roots
            .borrow_mut()
            .entry(root.to_path_buf())
            .or_default()
            .entry(package.name.clone())
            .or_default()
            .push(PackageDefinition {
                directory,
                package,
                git_url,
            });
    }
}

impl DefinitionLoader for MemoryDefinitionLoader {
    fn family_names(&self, root: &Path) -> Result<Vec<PackageName>> {
        Ok(self
            .roots
            .borrow()
            .get(root)
            .map(|families| families.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn load_family(
        &self,
        root: &Path,
        family: &PackageName,
        _scope: &LoadScope<'_>,
    ) -> Result<Vec<PackageDefinition>> {
        Ok(self
            .roots
            .borrow()
            .get(root)
            .and_then(|families| families.get(family))
            .cloned()
            .unwrap_or_default())
    }
}
