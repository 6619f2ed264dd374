//! The resolve-context engine seam.
//!
//! The solver never satisfies version ranges itself. It hands a requirement
//! list and a [`PackageRepository`] to a [`ContextEngine`] and reads back the
//! packages that make up a consistent context.

use std::sync::Arc;

use deliver_schema::{Package, PackageName, Requirement, Version};
use thiserror::Error;

use crate::error::DeliverError;

/// Read access to the packages visible on a search path.
pub trait PackageRepository {
    /// All visible versions of `family`, oldest first.
    ///
    /// When several paths hold the same version, the first path wins.
    ///
    /// # Errors
    ///
    /// Returns an error if an installed repository cannot be read.
    fn packages(&self, family: &PackageName) -> Result<Vec<Arc<Package>>, DeliverError>;
}

/// One package selected by a resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    /// Family name.
    pub name: PackageName,
    /// Selected version.
    pub version: Version,
    /// Selected variant, `None` for packages without variants.
    pub variant_index: Option<usize>,
}

impl ResolvedPackage {
    /// `name-version`, or just `name` when unversioned.
    pub fn qualified_name(&self) -> String {
        if self.version.is_empty() {
            self.name.to_string()
        } else {
            format!("{}-{}", self.name, self.version)
        }
    }
}

/// The outcome of a context resolve that could be attempted.
#[derive(Debug, Clone, Default)]
pub struct ResolvedContext {
    packages: Vec<ResolvedPackage>,
    failure: Option<String>,
}

impl ResolvedContext {
    /// A successful context, in dependency discovery order.
    pub fn solved(packages: Vec<ResolvedPackage>) -> Self {
        Self {
            packages,
            failure: None,
        }
    }

    /// A context whose requirements cannot be satisfied together.
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            packages: Vec::new(),
            failure: Some(description.into()),
        }
    }

    /// Whether the resolve succeeded.
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Resolved packages; empty on failure.
    pub fn packages(&self) -> &[ResolvedPackage] {
        &self.packages
    }

    /// Why the resolve failed.
    pub fn failure_description(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// The context could not even be attempted.
#[derive(Debug, Error)]
pub enum ContextError {
    /// No version of a required family exists on the search path.
    #[error("package family not found: {0}")]
    FamilyNotFound(PackageName),

    /// The family exists but no version satisfies the request.
    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// The repository could not be read.
    #[error(transparent)]
    Repository(#[from] DeliverError),
}

/// Resolves a requirement list into a consistent set of packages.
pub trait ContextEngine {
    /// Resolve `requests` against `repository`.
    ///
    /// Ephemeral requirements are ignored. Weak (`~`) and conflict (`!`)
    /// requirements constrain the result without adding packages.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when construction fails; an unsatisfiable but
    /// well-formed request yields `Ok` with [`ResolvedContext::success`] false.
    fn resolve(
        &self,
        requests: &[Requirement],
        repository: &dyn PackageRepository,
    ) -> Result<ResolvedContext, ContextError>;
}
