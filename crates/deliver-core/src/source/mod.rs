//! Package sources.
//!
//! A source is one logical location packages come from. Developer and bind
//! sources are loaded into the repository manager's memory store; installed
//! sources are read from disk on demand and cache their listings.

mod bind;
mod developer;
mod installed;

pub use bind::{BindSource, HostFacts};
pub use developer::DeveloperSource;
pub use installed::InstalledSource;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use deliver_schema::{Package, PackageName, Requirement, Version};
use tracing::warn;

use crate::engine::PackageRepository;
use crate::error::Result;

/// Identifies a source, and its slot in the memory store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKey {
    /// A developer definition tree.
    Developer(PathBuf),
    /// The synthesized host packages.
    Bind,
    /// An installed repository.
    Installed(PathBuf),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Developer(root) => write!(f, "developer:{}", root.display()),
            Self::Bind => f.write_str("bind"),
            Self::Installed(root) => write!(f, "installed:{}", root.display()),
        }
    }
}

/// What a source may see while it loads.
///
/// Wildcard ranges in requirements are expanded against the packages visible
/// here, so `foo-**` means the latest `foo` at load time.
pub struct LoadScope<'a> {
    repository: Option<&'a dyn PackageRepository>,
}

impl<'a> LoadScope<'a> {
    /// A scope backed by `repository`.
    pub fn new(repository: &'a dyn PackageRepository) -> Self {
        Self {
            repository: Some(repository),
        }
    }

    /// A scope that sees nothing. Wildcards stay unexpanded.
    pub fn empty() -> LoadScope<'static> {
        LoadScope { repository: None }
    }

    /// Expand wildcards in `requirement` against visible versions.
    pub fn expand(&self, mut requirement: Requirement) -> Requirement {
        if !requirement.range.has_wildcard() {
            return requirement;
        }
        let Some(repository) = self.repository else {
            return requirement;
        };
        match repository.packages(&requirement.name) {
            Ok(packages) => {
                let versions: Vec<Version> = packages.iter().map(|p| p.version.clone()).collect();
                requirement.range = requirement.range.expand_wildcards(&versions);
            }
            Err(e) => warn!("Cannot expand '{requirement}': {e}"),
        }
        requirement
    }
}

impl fmt::Debug for LoadScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadScope")
            .field("has_repository", &self.repository.is_some())
            .finish()
    }
}

/// A family and every version a source holds for it.
pub type FamilyBatch = (PackageName, Vec<Arc<Package>>);

/// Capability shared by every kind of source.
pub trait PackageSource {
    /// The key this source is stored under.
    fn key(&self) -> &SourceKey;

    /// Every family this source can provide.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing location cannot be listed.
    fn family_names(&self) -> Result<Vec<PackageName>>;

    /// Every version of `family`; empty when the source has none.
    ///
    /// # Errors
    ///
    /// Returns an error if a definition cannot be read.
    fn load(&self, family: &PackageName, scope: &LoadScope<'_>) -> Result<Vec<Arc<Package>>>;

    /// Every family with its versions.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`PackageSource::load`].
    fn load_all(&self, scope: &LoadScope<'_>) -> Result<Vec<FamilyBatch>> {
        let mut batches = Vec::new();
        for name in self.family_names()? {
            let packages = self.load(&name, scope)?;
            if !packages.is_empty() {
                batches.push((name, packages));
            }
        }
        Ok(batches)
    }

    /// `family` if this source has any version of it.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`PackageSource::load`].
    fn find_family(
        &self,
        family: &PackageName,
        scope: &LoadScope<'_>,
    ) -> Result<Option<Vec<Arc<Package>>>> {
        let packages = self.load(family, scope)?;
        Ok((!packages.is_empty()).then_some(packages))
    }

    /// Versions of `family`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`PackageSource::load`].
    fn find_versions(&self, family: &PackageName, scope: &LoadScope<'_>) -> Result<Vec<Version>> {
        let mut versions: Vec<Version> = self
            .load(family, scope)?
            .iter()
            .map(|p| p.version.clone())
            .collect();
        versions.sort();
        versions.dedup();
        Ok(versions)
    }
}
