//! `PubGrub` adapter for resolve contexts.
//!
//! Implements the `DependencyProvider` trait over a [`PackageRepository`] so a
//! requirement list can be resolved into a consistent set of packages. The
//! requirement list becomes the dependencies of a root pseudo-package.

use std::borrow::Borrow;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use deliver_schema::{Package, PackageName, Requirement, Variant, Version};
use pubgrub::error::PubGrubError;
use pubgrub::range::Range;
use pubgrub::report::{DefaultStringReporter, Reporter as _};
use pubgrub::solver::{Dependencies, DependencyConstraints, DependencyProvider};
use pubgrub::type_aliases::SelectedDependencies;
use tracing::{debug, trace};

use crate::engine::{ContextEngine, ContextError, PackageRepository, ResolvedContext, ResolvedPackage};

/// A [`Version`] that implements `PubGrub`'s `Version` trait.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion(
    /// The underlying [`Version`].
    pub Version,
);

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl pubgrub::version::Version for EngineVersion {
    fn lowest() -> Self {
        Self(Version::empty())
    }

    fn bump(&self) -> Self {
        Self(self.0.successor())
    }
}

/// A package identifier for the solver.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum PkgId {
    /// The pseudo-package whose dependencies are the requests.
    Root,
    /// A package family.
    Family(PackageName),
}

impl fmt::Display for PkgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("request"),
            Self::Family(name) => write!(f, "{name}"),
        }
    }
}

type Edges = HashMap<(PkgId, EngineVersion), Vec<PackageName>>;

/// Serves families from a repository to the solver.
///
/// Lookups are cached for the lifetime of one resolve. The first
/// [`ContextError`] raised inside a callback is kept so the caller can tell a
/// construction failure from an unsatisfiable request.
struct ContextProvider<'a> {
    repository: &'a dyn PackageRepository,
    requests: Vec<Requirement>,
    families: RefCell<HashMap<PackageName, Vec<Arc<Package>>>>,
    variants: RefCell<HashMap<(PackageName, Version), Option<usize>>>,
    edges: RefCell<Edges>,
    extra: RefCell<Vec<Requirement>>,
    error: RefCell<Option<ContextError>>,
}

impl<'a> ContextProvider<'a> {
    fn new(repository: &'a dyn PackageRepository, requests: &[Requirement]) -> Self {
        Self {
            repository,
            requests: requests.to_vec(),
            families: RefCell::new(HashMap::new()),
            variants: RefCell::new(HashMap::new()),
            edges: RefCell::new(HashMap::new()),
            extra: RefCell::new(Vec::new()),
            error: RefCell::new(None),
        }
    }

    fn root_version() -> EngineVersion {
        EngineVersion(Version::empty())
    }

    fn family(&self, name: &PackageName) -> Result<Vec<Arc<Package>>, ContextError> {
        if let Some(packages) = self.families.borrow().get(name) {
            return Ok(packages.clone());
        }
        let packages = self.repository.packages(name)?;
        if packages.is_empty() {
            return Err(ContextError::FamilyNotFound(name.clone()));
        }
        self.families.borrow_mut().insert(name.clone(), packages.clone());
        Ok(packages)
    }

    fn fail(&self, error: ContextError) -> Box<dyn Error> {
        let message = error.to_string();
        let mut slot = self.error.borrow_mut();
        if slot.is_none() {
            *slot = Some(error);
        }
        message.into()
    }

    /// Lower a requirement to the set of known versions it admits.
    ///
    /// `None` when the family has no such version.
    fn to_range(&self, requirement: &Requirement) -> Result<Option<Range<EngineVersion>>, ContextError> {
        let mut range: Option<Range<EngineVersion>> = None;
        for package in self.family(&requirement.name)? {
            if requirement.range.contains(&package.version) {
                let exact = Range::exact(EngineVersion(package.version.clone()));
                range = Some(match range {
                    Some(r) => r.union(&exact),
                    None => exact,
                });
            }
        }
        Ok(range)
    }

    fn constraints(
        &self,
        requirements: &[Requirement],
    ) -> Result<(DependencyConstraints<PkgId, EngineVersion>, Vec<PackageName>), ContextError> {
        let mut constraints: DependencyConstraints<PkgId, EngineVersion> = DependencyConstraints::default();
        let mut order = Vec::new();
        for requirement in requirements {
            if requirement.ephemeral {
                continue;
            }
            if !requirement.is_package_request() {
                self.extra.borrow_mut().push(requirement.clone());
                continue;
            }
            let range = self
                .to_range(requirement)?
                .ok_or_else(|| ContextError::PackageNotFound(requirement.to_string()))?;

            let id = PkgId::Family(requirement.name.clone());
            let merged = match constraints.get(&id) {
                Some(existing) => existing.intersection(&range),
                None => range,
            };
            constraints.insert(id, merged);
            if !order.contains(&requirement.name) {
                order.push(requirement.name.clone());
            }
        }
        Ok((constraints, order))
    }

    /// Whether weak and conflict requirements seen so far admit `version`.
    fn admits(&self, name: &PackageName, version: &Version) -> bool {
        self.extra
            .borrow()
            .iter()
            .filter(|r| r.name == *name)
            .all(|r| r.accepts(version))
    }

    fn satisfiable(&self, variant: &Variant) -> bool {
        variant.variant_requires().iter().filter(|r| r.is_package_request()).all(|r| {
            self.family(&r.name)
                .is_ok_and(|packages| packages.iter().any(|p| r.range.contains(&p.version)))
        })
    }

    /// The variant used for `name`-`version`: the first whose own requests
    /// can all be met, else the first.
    fn select_variant(&self, name: &PackageName, version: &Version) -> Result<Option<Variant>, ContextError> {
        let Some(package) = self.family(name)?.into_iter().find(|p| p.version == *version) else {
            return Ok(None);
        };
        let variants = package.variants(true);
        let selected = variants
            .iter()
            .find(|v| self.satisfiable(v))
            .or_else(|| variants.first())
            .cloned();
        if let Some(variant) = &selected {
            trace!("Selected variant {variant}");
            self.variants
                .borrow_mut()
                .insert((name.clone(), version.clone()), variant.index());
        }
        Ok(selected)
    }

    fn resolved(&self, name: &PackageName, version: &EngineVersion) -> ResolvedPackage {
        ResolvedPackage {
            name: name.clone(),
            version: version.0.clone(),
            variant_index: self
                .variants
                .borrow()
                .get(&(name.clone(), version.0.clone()))
                .copied()
                .flatten(),
        }
    }

    /// Solution packages in depth-first discovery order from the requests.
    fn ordered(&self, solution: &SelectedDependencies<PkgId, EngineVersion>) -> Vec<ResolvedPackage> {
        let edges = self.edges.borrow();
        let children = |id: PkgId, version: &EngineVersion| {
            edges
                .get(&(id, version.clone()))
                .map(|names| names.iter().rev().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = children(PkgId::Root, &Self::root_version());
        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let id = PkgId::Family(name.clone());
            let Some(version) = solution.get(&id) else {
                continue;
            };
            ordered.push(self.resolved(&name, version));
            stack.extend(children(id, version));
        }

        let mut rest: Vec<ResolvedPackage> = solution
            .iter()
            .filter_map(|(id, version)| match id {
                PkgId::Family(name) if !visited.contains(name) => Some(self.resolved(name, version)),
                _ => None,
            })
            .collect();
        rest.sort_by(|a, b| a.name.cmp(&b.name));
        ordered.extend(rest);
        ordered
    }
}

impl DependencyProvider<PkgId, EngineVersion> for ContextProvider<'_> {
    fn choose_package_version<T: Borrow<PkgId>, U: Borrow<Range<EngineVersion>>>(
        &self,
        mut potential_packages: impl Iterator<Item = (T, U)>,
    ) -> Result<(T, Option<EngineVersion>), Box<dyn Error>> {
        let (package, range) = potential_packages
            .next()
            .ok_or("no package left to choose")?;

        let version = match package.borrow() {
            PkgId::Root => Some(Self::root_version()),
            PkgId::Family(name) => {
                let family = self.family(name).map_err(|e| self.fail(e))?;
                let range: &Range<EngineVersion> = range.borrow();
                family
                    .iter()
                    .rev()
                    .map(|p| EngineVersion(p.version.clone()))
                    .find(|v| range.contains(v) && self.admits(name, &v.0))
            }
        };
        Ok((package, version))
    }

    fn get_dependencies(
        &self,
        package: &PkgId,
        version: &EngineVersion,
    ) -> Result<Dependencies<PkgId, EngineVersion>, Box<dyn Error>> {
        let requirements = match package {
            PkgId::Root => self.requests.clone(),
            PkgId::Family(name) => match self.select_variant(name, &version.0).map_err(|e| self.fail(e))? {
                Some(variant) => variant.runtime_requirements(true),
                None => return Ok(Dependencies::Unknown),
            },
        };

        let (constraints, order) = self.constraints(&requirements).map_err(|e| self.fail(e))?;
        self.edges
            .borrow_mut()
            .insert((package.clone(), version.clone()), order);
        Ok(Dependencies::Known(constraints))
    }
}

/// A [`ContextEngine`] backed by the `PubGrub` solver.
///
/// Newest versions are tried first. Each package contributes the runtime
/// requirements of its first satisfiable variant, evaluated at build time.
/// Weak and conflict requirements only filter versions and are checked
/// against the final solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PubgrubEngine;

impl ContextEngine for PubgrubEngine {
    fn resolve(
        &self,
        requests: &[Requirement],
        repository: &dyn PackageRepository,
    ) -> Result<ResolvedContext, ContextError> {
        let provider = ContextProvider::new(repository, requests);
        let outcome = pubgrub::solver::resolve(&provider, PkgId::Root, ContextProvider::root_version());

        if let Some(error) = provider.error.borrow_mut().take() {
            return Err(error);
        }

        let solution = match outcome {
            Ok(solution) => solution,
            Err(PubGrubError::NoSolution(mut tree)) => {
                tree.collapse_no_versions();
                return Ok(ResolvedContext::failed(DefaultStringReporter::report(&tree)));
            }
            Err(e) => return Ok(ResolvedContext::failed(e.to_string())),
        };

        for requirement in provider.extra.borrow().iter() {
            let Some(version) = solution.get(&PkgId::Family(requirement.name.clone())) else {
                continue;
            };
            if !requirement.accepts(&version.0) {
                return Ok(ResolvedContext::failed(format!(
                    "{}-{version} violates '{requirement}'",
                    requirement.name
                )));
            }
        }

        let packages = provider.ordered(&solution);
        debug!(
            "Resolved {} request(s) into {} package(s)",
            requests.len(),
            packages.len()
        );
        Ok(ResolvedContext::solved(packages))
    }
}
