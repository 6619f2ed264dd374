//! Recursive request resolution into an install manifest.
//!
//! For each request the solver compares the newest developer package with the
//! newest installed one, pairs their variants, and resolves the build
//! requirements of every selected variant through the [`ContextEngine`]. Each
//! package in a successful context is resolved in turn, so the manifest lists
//! dependencies before their dependents.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use deliver_schema::{Package, PackageName, PackageOrigin, Requirement, Variant, Version};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DeployMode;
use crate::engine::{ContextEngine, ContextError, ResolvedContext};
use crate::error::{DeliverError, Result};
use crate::reporter::{NullReporter, Reporter};
use crate::repository::{RepositoryManager, SearchPath};

static VARIANT_REQUEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<request>.+)\[(?P<index>[0-9]+)\]$").expect("valid regex"));

/// Identity of a manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntryId {
    /// Qualified package name, or the request text for unmatched requests.
    pub name: String,
    /// Variant index, `None` for packages without variants.
    pub index: Option<usize>,
}

impl EntryId {
    /// Create an identity.
    pub fn new(name: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{i}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// How a manifest entry will be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Needs building, releasing or binding.
    Ready,
    /// Already deployed.
    Installed,
    /// Only available installed; nothing to do and nothing we could do.
    External,
    /// Its build requirements could not be resolved.
    ResolveFailed,
    /// No source has a matching package.
    PackageNotFound,
}

impl Status {
    /// Whether the status can no longer change during a resolve pass.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ResolveFailed | Self::PackageNotFound)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::Installed => "installed",
            Self::External => "external",
            Self::ResolveFailed => "failed",
            Self::PackageNotFound => "missing",
        })
    }
}

/// One package variant in the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    id: EntryId,
    family: PackageName,
    version: Option<Version>,
    source: Option<PackageOrigin>,
    status: Status,
    depended_by: Vec<EntryId>,
}

impl ManifestEntry {
    fn new(id: EntryId, family: PackageName, version: Option<Version>, status: Status) -> Self {
        Self {
            id,
            family,
            version,
            source: None,
            status,
            depended_by: Vec::new(),
        }
    }

    /// The entry's identity.
    pub fn id(&self) -> &EntryId {
        &self.id
    }

    /// Qualified name, or the request text when nothing matched.
    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Variant index.
    pub fn index(&self) -> Option<usize> {
        self.id.index
    }

    /// Package family.
    pub fn family(&self) -> &PackageName {
        &self.family
    }

    /// Selected version, if a package was found.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Where the selected variant comes from.
    pub fn source(&self) -> Option<&PackageOrigin> {
        self.source.as_ref()
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Entries whose build contexts pulled this one in.
    pub fn depended_by(&self) -> &[EntryId] {
        &self.depended_by
    }

    /// Whether the package is deployed by writing its definition.
    pub fn is_synthesized(&self) -> bool {
        self.source == Some(PackageOrigin::Synthesized)
    }

    fn set_status(&mut self, status: Status) {
        if !self.status.is_terminal() {
            self.status = status;
        }
    }

    fn add_dependent(&mut self, id: &EntryId) {
        if !self.depended_by.contains(id) {
            self.depended_by.push(id.clone());
        }
    }
}

type VariantPair = (Option<Variant>, Option<Variant>);

/// Pair developer variants with the installed variants built from them.
///
/// Developer variants keep declaration order and take the installed variant
/// with the same requirement signature. Installed leftovers follow, last
/// first.
fn pair_variants(developer: Option<&Arc<Package>>, installed: Option<&Arc<Package>>) -> Vec<VariantPair> {
    let developer = developer.map(|p| p.variants(true)).unwrap_or_default();
    let mut installed = installed.map(|p| p.variants(true)).unwrap_or_default();

    let mut pairs = Vec::with_capacity(developer.len() + installed.len());
    for variant in developer {
        let signature = variant.signature();
        let matched = installed
            .iter()
            .position(|i| i.signature() == signature)
            .map(|pos| installed.remove(pos));
        pairs.push((Some(variant), matched));
    }
    while let Some(variant) = installed.pop() {
        pairs.push((None, Some(variant)));
    }
    pairs
}

/// Split `name-range[index]` into the request and variant index.
///
/// # Errors
///
/// Returns [`DeliverError::Request`] if the index does not fit a `usize`.
pub fn parse_variant_request(text: &str) -> Result<(&str, Option<usize>)> {
    let Some(caps) = VARIANT_REQUEST.captures(text) else {
        return Ok((text, None));
    };
    let (Some(request), Some(index)) = (caps.name("request"), caps.name("index")) else {
        return Ok((text, None));
    };
    let index = index
        .as_str()
        .parse()
        .map_err(|e| DeliverError::Request(format!("'{text}': bad variant index: {e}")))?;
    Ok((request.as_str(), Some(index)))
}

/// Resolves requests into an ordered manifest.
pub struct RequestSolver {
    repository: RepositoryManager,
    engine: Box<dyn ContextEngine>,
    reporter: Arc<dyn Reporter>,
    conflicts: Vec<Requirement>,
    entries: HashMap<EntryId, ManifestEntry>,
    order: Vec<EntryId>,
    appended: HashSet<EntryId>,
}

impl RequestSolver {
    /// A solver over `repository` using `engine` for contexts.
    pub fn new(repository: RepositoryManager, engine: impl ContextEngine + 'static) -> Self {
        Self {
            repository,
            engine: Box::new(engine),
            reporter: Arc::new(NullReporter),
            conflicts: Vec::new(),
            entries: HashMap::new(),
            order: Vec::new(),
            appended: HashSet::new(),
        }
    }

    /// Report progress to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The repository manager.
    pub fn repository(&self) -> &RepositoryManager {
        &self.repository
    }

    /// Mutable access to the repository manager.
    pub fn repository_mut(&mut self) -> &mut RepositoryManager {
        &mut self.repository
    }

    /// The progress reporter.
    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    /// The deploy mode in effect.
    pub fn mode(&self) -> DeployMode {
        self.repository.mode()
    }

    /// Switch deploy mode and clear the manifest.
    pub fn set_mode(&mut self, mode: DeployMode) {
        self.repository.set_mode(mode);
        self.reset();
    }

    /// Clear the manifest.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.appended.clear();
    }

    /// Entries resolved since the last reset, dependencies first.
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .cloned()
            .collect()
    }

    /// Look up one entry.
    pub fn entry(&self, id: &EntryId) -> Option<&ManifestEntry> {
        self.entries.get(id)
    }

    /// Parse and resolve command-line style requests.
    ///
    /// The manifest is reset first. Each request may end in `[N]` to pick one
    /// variant. Weak and conflict requests constrain every context instead of
    /// being resolved themselves.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Request`] for malformed requests and propagates
    /// repository errors.
    pub fn resolve_requests(&mut self, requests: &[&str]) -> Result<()> {
        self.reset();

        let mut conflicts = Vec::new();
        let mut packages = Vec::new();
        for text in requests {
            let (request, index) = parse_variant_request(text.trim())?;
            let requirement = Requirement::parse(request)?;
            if requirement.is_conflict() || requirement.is_weak() {
                conflicts.push(requirement);
            } else {
                packages.push((requirement, index));
            }
        }

        self.with_conflicts(conflicts, |solver| {
            for (requirement, index) in &packages {
                solver.resolve(requirement, *index)?;
            }
            Ok(())
        })
    }

    /// Run `f` with weak and conflict `requests` added to every context.
    ///
    /// The previous set is restored when `f` returns, also on error.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Request`] if a request is neither weak nor a
    /// conflict, otherwise whatever `f` returns.
    pub fn with_conflicts<F>(&mut self, requests: Vec<Requirement>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if let Some(bad) = requests.iter().find(|r| !(r.is_conflict() || r.is_weak())) {
            return Err(DeliverError::Request(format!(
                "'{bad}' is not a conflict or weak request"
            )));
        }

        let mut scoped = self.conflicts.clone();
        scoped.extend(requests);
        let previous = std::mem::replace(&mut self.conflicts, scoped);
        let result = f(self);
        self.conflicts = previous;
        result
    }

    /// Resolve `request` and its build dependencies into the manifest.
    ///
    /// With `variant_index`, only that variant of the matched package is
    /// resolved. Resolution failures are recorded as entry status.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Request`] for weak, conflict or ephemeral
    /// requests and propagates repository errors.
    pub fn resolve(&mut self, request: &Requirement, variant_index: Option<usize>) -> Result<()> {
        if !request.is_package_request() {
            return Err(DeliverError::Request(format!(
                "'{request}' does not name an installable package"
            )));
        }
        self.resolve_with(request, variant_index, None)
    }

    fn installed_paths(&self) -> Vec<PathBuf> {
        self.repository
            .settings()
            .installed_packages_path(self.repository.mode())
    }

    fn context_paths(&self) -> Vec<SearchPath> {
        let mut paths = self.repository.memory_paths();
        paths.extend(self.installed_paths().into_iter().map(SearchPath::Filesystem));
        paths
    }

    fn resolve_with(
        &mut self,
        request: &Requirement,
        variant_index: Option<usize>,
        depended_by: Option<&EntryId>,
    ) -> Result<()> {
        let developer = self.repository.find(request, true)?;
        let installed = self.repository.find_installed(request, &self.installed_paths())?;

        let (developer, installed, candidate) = match (developer, installed) {
            (None, None) => {
                self.record_missing(request, depended_by);
                return Ok(());
            }
            (Some(dev), Some(inst)) => match dev.version.cmp(&inst.version) {
                Ordering::Greater => (Some(dev), None, Status::Ready),
                Ordering::Less => (None, Some(inst), Status::Installed),
                Ordering::Equal => (Some(dev), Some(inst), Status::Ready),
            },
            (Some(dev), None) => (Some(dev), None, Status::Ready),
            (None, Some(inst)) => (None, Some(inst), Status::External),
        };

        for (dev_variant, inst_variant) in pair_variants(developer.as_ref(), installed.as_ref()) {
            // Developer declaration order decides the index. An installed
            // variant no developer variant matches has no index to build at.
            let index = match (&dev_variant, &inst_variant) {
                (Some(dev), _) => dev.index(),
                (None, Some(inst)) if developer.is_none() => inst.index(),
                (None, Some(inst)) => {
                    debug!("Ignoring installed variant {:?} of {request}: no developer match", inst.index());
                    continue;
                }
                (None, None) => continue,
            };
            if variant_index.is_some() && index != variant_index {
                continue;
            }
            let status = match (&inst_variant, candidate) {
                (Some(_), Status::Ready) => Status::Installed,
                _ => candidate,
            };
            let Some(variant) = inst_variant.or(dev_variant) else {
                continue;
            };
            self.resolve_variant(&variant, index, status, depended_by)?;
        }
        Ok(())
    }

    /// Record `variant` under `index` and resolve its build context.
    ///
    /// `variant` supplies source, status and requirements; it is the
    /// installed variant when one matched.
    fn resolve_variant(
        &mut self,
        variant: &Variant,
        index: Option<usize>,
        status: Status,
        depended_by: Option<&EntryId>,
    ) -> Result<()> {
        let package = variant.package();
        let id = EntryId::new(package.qualified_name(), index);
        {
            let entry = self.entries.entry(id.clone()).or_insert_with(|| {
                ManifestEntry::new(id.clone(), package.name.clone(), Some(package.version.clone()), status)
            });
            entry.source = Some(package.origin.clone());
            entry.set_status(status);
            if let Some(dependent) = depended_by {
                entry.add_dependent(dependent);
            }
        }
        debug!("Resolving {id} ({status})");

        let context = self.build_context(variant)?;
        if let Some(detail) = context.failure_description() {
            warn!("Cannot resolve build context of {id}");
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.set_status(Status::ResolveFailed);
            }
            self.reporter.resolve_failed(&id.to_string(), detail);
        } else {
            for resolved in context.packages() {
                let child = EntryId::new(resolved.qualified_name(), resolved.variant_index);
                if let Some(existing) = self.entries.get_mut(&child) {
                    existing.add_dependent(&id);
                    continue;
                }
                let request = Requirement::exact(resolved.name.clone(), &resolved.version);
                self.resolve_with(&request, resolved.variant_index, Some(&id))?;
            }
        }

        self.append(id);
        Ok(())
    }

    /// Resolve the build requirements of `variant`.
    ///
    /// A family missing from the search path is loaded once and the context
    /// rebuilt; other construction failures become a failed context.
    fn build_context(&mut self, variant: &Variant) -> Result<ResolvedContext> {
        let mut requests = variant.build_requirements();
        requests.extend(self.conflicts.iter().cloned());

        let mut retried: HashSet<PackageName> = HashSet::new();
        loop {
            let outcome = {
                let view = self.repository.view(self.context_paths());
                self.engine.resolve(&requests, &view)
            };
            match outcome {
                Ok(context) => return Ok(context),
                Err(ContextError::FamilyNotFound(family)) if retried.insert(family.clone()) => {
                    debug!("Loading {family} for {variant} and retrying");
                    self.repository.load(Some(&family), true)?;
                }
                Err(ContextError::Repository(e)) => return Err(e),
                Err(e) => return Ok(ResolvedContext::failed(e.to_string())),
            }
        }
    }

    fn record_missing(&mut self, request: &Requirement, depended_by: Option<&EntryId>) {
        let id = EntryId::new(request.to_string(), None);
        warn!("No package matches {request}");
        self.reporter.warning(&format!("No package matches {request}"));
        let entry = self.entries.entry(id.clone()).or_insert_with(|| {
            ManifestEntry::new(id.clone(), request.name.clone(), None, Status::PackageNotFound)
        });
        entry.set_status(Status::PackageNotFound);
        if let Some(dependent) = depended_by {
            entry.add_dependent(dependent);
        }
        self.append(id);
    }

    /// Push `id` onto the manifest order unless it is already there.
    fn append(&mut self, id: EntryId) {
        if self.appended.insert(id.clone()) {
            self.order.push(id);
        }
    }
}

impl fmt::Debug for RequestSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSolver")
            .field("repository", &self.repository)
            .field("conflicts", &self.conflicts)
            .field("entries", &self.order.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reqs(items: &[&str]) -> Vec<Requirement> {
        items.iter().map(|s| Requirement::parse(s).unwrap()).collect()
    }

    fn package(version: &str, variants: &[&[&str]]) -> Arc<Package> {
        Arc::new(
            Package::new("foo", Version::parse(version).unwrap(), PackageOrigin::Synthesized)
                .with_variants(variants.iter().map(|v| reqs(v)).collect()),
        )
    }

    fn describe(pairs: &[VariantPair]) -> Vec<(Option<usize>, Option<usize>)> {
        pairs
            .iter()
            .map(|(d, i)| (d.as_ref().and_then(Variant::index), i.as_ref().and_then(Variant::index)))
            .collect()
    }

    #[test]
    fn test_pairing_matches_by_signature() {
        let dev = package("1", &[&["python-3", "qt"], &["python-2"]]);
        let inst = package("1", &[&["python-2"], &["qt", "python-3"]]);
        let pairs = pair_variants(Some(&dev), Some(&inst));
        assert_eq!(describe(&pairs), vec![(Some(0), Some(1)), (Some(1), Some(0))]);
    }

    #[test]
    fn test_pairing_drains_installed_leftovers_last_first() {
        let dev = package("1", &[&["a"]]);
        let inst = package("1", &[&["x"], &["a"], &["y"]]);
        let pairs = pair_variants(Some(&dev), Some(&inst));
        assert_eq!(
            describe(&pairs),
            vec![(Some(0), Some(1)), (None, Some(2)), (None, Some(0))]
        );

        let pairs = pair_variants(Some(&dev), None);
        assert_eq!(describe(&pairs), vec![(Some(0), None)]);
    }

    #[test]
    fn test_parse_variant_request() {
        assert_eq!(parse_variant_request("foo-1[2]").unwrap(), ("foo-1", Some(2)));
        assert_eq!(parse_variant_request("foo-1").unwrap(), ("foo-1", None));
        assert_eq!(parse_variant_request("foo[x]").unwrap(), ("foo[x]", None));
        assert!(parse_variant_request("foo[99999999999999999999999]").is_err());
    }

    #[test]
    fn test_terminal_status_sticks() {
        let mut entry = ManifestEntry::new(EntryId::new("foo-1", None), PackageName::new("foo"), None, Status::Ready);
        entry.set_status(Status::ResolveFailed);
        entry.set_status(Status::Installed);
        assert_eq!(entry.status(), Status::ResolveFailed);

        entry.add_dependent(&EntryId::new("bar-1", Some(0)));
        entry.add_dependent(&EntryId::new("bar-1", Some(0)));
        assert_eq!(entry.depended_by().len(), 1);
        assert_eq!(entry.depended_by()[0].to_string(), "bar-1[0]");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::PackageNotFound.to_string(), "missing");
        assert_eq!(Status::ResolveFailed.to_string(), "failed");
        assert!(!Status::External.is_terminal());
    }
}
