//! The package and variant model.
//!
//! A [`Package`] is one version of a family. Its requirement lists may depend
//! on whether the package is being built and which variant is selected, so
//! they are stored as [`Conditional`] values and evaluated against a
//! [`BuildContext`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::requirement::Requirement;
use crate::types::PackageName;
use crate::version::Version;

/// The evaluation context for conditional package attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildContext {
    /// Whether the package is being built rather than consumed.
    pub building: bool,
    /// The variant being built, if any.
    pub variant_index: Option<usize>,
}

impl BuildContext {
    /// Runtime evaluation with no variant selected.
    pub fn runtime() -> Self {
        Self::default()
    }

    /// Build-time evaluation for the given variant.
    pub fn building(variant_index: Option<usize>) -> Self {
        Self {
            building: true,
            variant_index,
        }
    }
}

/// A value that is either fixed or computed from a [`BuildContext`].
pub enum Conditional<T> {
    /// The same value in every context.
    Fixed(T),
    /// Recomputed for each context.
    Evaluated(Arc<dyn Fn(&BuildContext) -> T + Send + Sync>),
}

impl<T: Clone> Conditional<T> {
    /// Wrap a closure as a conditional value.
    pub fn evaluated(f: impl Fn(&BuildContext) -> T + Send + Sync + 'static) -> Self {
        Self::Evaluated(Arc::new(f))
    }

    /// Resolve the value for `context`.
    pub fn evaluate(&self, context: &BuildContext) -> T {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::Evaluated(f) => f(context),
        }
    }
}

impl<T: Clone> Clone for Conditional<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(value) => Self::Fixed(value.clone()),
            Self::Evaluated(f) => Self::Evaluated(Arc::clone(f)),
        }
    }
}

impl<T: Default> Default for Conditional<T> {
    fn default() -> Self {
        Self::Fixed(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Conditional<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Evaluated(_) => f.write_str("Evaluated(..)"),
        }
    }
}

impl<T> From<T> for Conditional<T> {
    fn from(value: T) -> Self {
        Self::Fixed(value)
    }
}

/// Where a package definition came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum PackageOrigin {
    /// A developer definition file, built from source.
    Developer(PathBuf),
    /// A deployed package directory.
    Installed(PathBuf),
    /// Generated in memory, deployed by writing its definition.
    Synthesized,
}

impl PackageOrigin {
    /// The filesystem location behind this origin, if there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Developer(p) | Self::Installed(p) => Some(p),
            Self::Synthesized => None,
        }
    }
}

impl fmt::Display for PackageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Developer(p) | Self::Installed(p) => write!(f, "{}", p.display()),
            Self::Synthesized => f.write_str("<synthesized>"),
        }
    }
}

/// One version of a package family.
#[derive(Debug, Clone)]
pub struct Package {
    /// Family name.
    pub name: PackageName,
    /// Version; empty for unversioned packages.
    pub version: Version,
    /// Runtime requirements.
    pub requires: Conditional<Vec<Requirement>>,
    /// Requirements needed to build this package and its dependents' builds.
    pub build_requires: Conditional<Vec<Requirement>>,
    /// Requirements needed only to build this package.
    pub private_build_requires: Conditional<Vec<Requirement>>,
    /// Per-variant requirement lists. Empty means a single implicit variant.
    pub variants: Conditional<Vec<Vec<Requirement>>>,
    /// Where the definition came from.
    pub origin: PackageOrigin,
}

impl Package {
    /// A package with no requirements and no variants.
    pub fn new(name: impl Into<PackageName>, version: Version, origin: PackageOrigin) -> Self {
        Self {
            name: name.into(),
            version,
            requires: Conditional::default(),
            build_requires: Conditional::default(),
            private_build_requires: Conditional::default(),
            variants: Conditional::default(),
            origin,
        }
    }

    /// Set fixed runtime requirements.
    pub fn with_requires(mut self, requires: Vec<Requirement>) -> Self {
        self.requires = Conditional::Fixed(requires);
        self
    }

    /// Set fixed build requirements.
    pub fn with_build_requires(mut self, requires: Vec<Requirement>) -> Self {
        self.build_requires = Conditional::Fixed(requires);
        self
    }

    /// Set fixed variants.
    pub fn with_variants(mut self, variants: Vec<Vec<Requirement>>) -> Self {
        self.variants = Conditional::Fixed(variants);
        self
    }

    /// `name-version`, or just `name` when unversioned.
    pub fn qualified_name(&self) -> String {
        if self.version.is_empty() {
            self.name.to_string()
        } else {
            format!("{}-{}", self.name, self.version)
        }
    }

    /// Whether this package only exists in memory until deployed.
    pub fn is_synthesized(&self) -> bool {
        self.origin == PackageOrigin::Synthesized
    }

    /// Enumerate variants, evaluating the variant list for `building`.
    ///
    /// A package without variants has exactly one implicit variant whose
    /// index is `None`.
    pub fn variants(self: &Arc<Self>, building: bool) -> Vec<Variant> {
        let context = BuildContext {
            building,
            variant_index: None,
        };
        let lists = self.variants.evaluate(&context);
        if lists.is_empty() {
            return vec![Variant {
                package: Arc::clone(self),
                index: None,
                requires: Vec::new(),
            }];
        }
        lists
            .into_iter()
            .enumerate()
            .map(|(i, requires)| Variant {
                package: Arc::clone(self),
                index: Some(i),
                requires,
            })
            .collect()
    }

    /// Look up one variant by index.
    pub fn variant(self: &Arc<Self>, index: Option<usize>, building: bool) -> Option<Variant> {
        self.variants(building).into_iter().find(|v| v.index == index)
    }

    /// Every requirement any build-time variant of this package may need.
    pub fn all_build_requirements(self: &Arc<Self>) -> Vec<Requirement> {
        self.variants(true)
            .iter()
            .flat_map(Variant::build_requirements)
            .collect()
    }
}

/// One build configuration of a package.
#[derive(Debug, Clone)]
pub struct Variant {
    package: Arc<Package>,
    index: Option<usize>,
    requires: Vec<Requirement>,
}

impl Variant {
    /// The package this variant belongs to.
    pub fn package(&self) -> &Arc<Package> {
        &self.package
    }

    /// Position in the variant list, `None` for the implicit variant.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// The variant's own requirement list.
    pub fn variant_requires(&self) -> &[Requirement] {
        &self.requires
    }

    /// The evaluation context for this variant.
    pub fn context(&self, building: bool) -> BuildContext {
        BuildContext {
            building,
            variant_index: self.index,
        }
    }

    /// An order-insensitive key for the variant's requirements.
    ///
    /// Used to pair a developer variant with the installed variant that was
    /// built from it.
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self.requires.iter().map(ToString::to_string).collect();
        parts.sort();
        parts.join(" ")
    }

    /// Runtime requirements of the package plus this variant's list.
    pub fn runtime_requirements(&self, building: bool) -> Vec<Requirement> {
        let mut requirements = self.package.requires.evaluate(&self.context(building));
        requirements.extend(self.requires.iter().cloned());
        requirements
    }

    /// Everything needed to build this variant.
    ///
    /// Runtime requirements, the variant's list, build requirements and
    /// private build requirements, all evaluated at build time.
    pub fn build_requirements(&self) -> Vec<Requirement> {
        let context = self.context(true);
        let mut requirements = self.runtime_requirements(true);
        requirements.extend(self.package.build_requires.evaluate(&context));
        requirements.extend(self.package.private_build_requires.evaluate(&context));
        requirements
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{i}]", self.package.qualified_name()),
            None => f.write_str(&self.package.qualified_name()),
        }
    }
}
