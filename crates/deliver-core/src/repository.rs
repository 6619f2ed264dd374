//! Repository manager.
//!
//! Developer and bind sources are loaded lazily, family by family, into an
//! in-memory store keyed by [`SourceKey`]. Installed repositories stay on disk
//! and are read through cached [`InstalledSource`]s. A [`SearchView`] combines
//! both behind the [`PackageRepository`] trait for the context engine.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use deliver_schema::{Package, PackageName, Requirement};
use tracing::{debug, trace};

use crate::config::{DeployMode, Settings};
use crate::definition::DefinitionLoader;
use crate::engine::PackageRepository;
use crate::error::Result;
use crate::paths::normalize;
use crate::source::{
    BindSource, DeveloperSource, InstalledSource, LoadScope, PackageSource, SourceKey,
};
use crate::tags::TagLister;

/// One entry of a search path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchPath {
    /// An installed repository on disk.
    Filesystem(PathBuf),
    /// A source's slot in the memory store.
    Memory(SourceKey),
}

impl std::fmt::Display for SearchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filesystem(p) => write!(f, "{}", p.display()),
            Self::Memory(key) => write!(f, "memory@{key}"),
        }
    }
}

/// The ambient search path with an optional temporary override.
#[derive(Debug, Clone, Default)]
pub struct SearchPathConfig {
    packages_path: Vec<SearchPath>,
    override_path: Option<Vec<SearchPath>>,
}

impl SearchPathConfig {
    /// A configuration searching `packages_path`.
    pub fn new(packages_path: Vec<SearchPath>) -> Self {
        Self {
            packages_path,
            override_path: None,
        }
    }

    /// The path currently in effect.
    pub fn effective(&self) -> &[SearchPath] {
        self.override_path.as_deref().unwrap_or(&self.packages_path)
    }
}

/// Extends a [`SearchPathConfig`] until dropped.
///
/// The previous override is restored on drop, including when the scope is
/// left through `?` or a panic.
#[derive(Debug)]
pub struct SearchPathOverride<'a> {
    config: &'a mut SearchPathConfig,
    previous: Option<Vec<SearchPath>>,
}

impl<'a> SearchPathOverride<'a> {
    /// Append `extra` to the effective path of `config`.
    pub fn extend(config: &'a mut SearchPathConfig, extra: impl IntoIterator<Item = SearchPath>) -> Self {
        let mut paths = config.effective().to_vec();
        for path in extra {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        let previous = config.override_path.replace(paths);
        Self { config, previous }
    }
}

impl Deref for SearchPathOverride<'_> {
    type Target = SearchPathConfig;

    fn deref(&self) -> &Self::Target {
        self.config
    }
}

impl Drop for SearchPathOverride<'_> {
    fn drop(&mut self) {
        self.config.override_path = self.previous.take();
    }
}

/// Packages loaded from memory-backed sources.
#[derive(Debug, Default)]
pub struct MemoryStore {
    repos: HashMap<SourceKey, BTreeMap<PackageName, Vec<Arc<Package>>>>,
}

impl MemoryStore {
    /// Merge `packages` into `family` under `key`. Same versions are replaced.
    pub fn insert(&mut self, key: &SourceKey, family: PackageName, packages: Vec<Arc<Package>>) {
        let slot = self.repos.entry(key.clone()).or_default().entry(family).or_default();
        for package in packages {
            match slot.iter_mut().find(|p| p.version == package.version) {
                Some(existing) => *existing = package,
                None => slot.push(package),
            }
        }
        slot.sort_by(|a, b| a.version.cmp(&b.version));
    }

    /// Versions of `family` stored under `key`, oldest first.
    pub fn family(&self, key: &SourceKey, family: &PackageName) -> &[Arc<Package>] {
        self.repos
            .get(key)
            .and_then(|families| families.get(family))
            .map_or(&[], Vec::as_slice)
    }

    /// Families stored under `key`.
    pub fn family_names(&self, key: &SourceKey) -> impl Iterator<Item = &PackageName> {
        self.repos.get(key).into_iter().flat_map(BTreeMap::keys)
    }
}

/// Installed sources, created on first use per directory.
struct InstalledRepos {
    loader: Rc<dyn DefinitionLoader>,
    sources: RefCell<BTreeMap<PathBuf, Rc<InstalledSource>>>,
}

impl InstalledRepos {
    fn source(&self, root: &Path) -> Rc<InstalledSource> {
        let root = normalize(root);
        Rc::clone(
            self.sources
                .borrow_mut()
                .entry(root.clone())
                .or_insert_with(|| Rc::new(InstalledSource::new(root, Rc::clone(&self.loader)))),
        )
    }

    fn invalidate(&self, root: &Path) {
        if let Some(source) = self.sources.borrow().get(&normalize(root)) {
            source.invalidate();
        }
    }
}

/// Per-source record of what has been loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadState {
    loaded: HashSet<PackageName>,
    fully_loaded: bool,
}

impl LoadState {
    /// Whether `family` no longer needs loading.
    pub fn has_loaded(&self, family: &PackageName) -> bool {
        self.fully_loaded || self.loaded.contains(family)
    }
}

/// A read-only view over an ordered search path.
pub struct SearchView<'a> {
    store: &'a MemoryStore,
    installed: &'a InstalledRepos,
    paths: Vec<SearchPath>,
}

impl SearchView<'_> {
    /// The paths searched, in precedence order.
    pub fn paths(&self) -> &[SearchPath] {
        &self.paths
    }
}

impl PackageRepository for SearchView<'_> {
    fn packages(&self, family: &PackageName) -> Result<Vec<Arc<Package>>> {
        let mut found: Vec<Arc<Package>> = Vec::new();
        for path in &self.paths {
            let packages = match path {
                SearchPath::Memory(key) => self.store.family(key, family).to_vec(),
                SearchPath::Filesystem(root) => self.installed.source(root).family(family)?,
            };
            for package in packages {
                if !found.iter().any(|p| p.version == package.version) {
                    found.push(package);
                }
            }
        }
        found.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(found)
    }
}

impl std::fmt::Debug for SearchView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchView").field("paths", &self.paths).finish_non_exhaustive()
    }
}

fn latest_matching(repository: &dyn PackageRepository, request: &Requirement) -> Result<Option<Arc<Package>>> {
    Ok(repository
        .packages(&request.name)?
        .into_iter()
        .filter(|p| request.range.contains(&p.version))
        .max_by(|a, b| a.version.cmp(&b.version)))
}

/// Aggregates every package source behind one memory-backed search path.
pub struct RepositoryManager {
    settings: Settings,
    mode: DeployMode,
    search_path: SearchPathConfig,
    sources: Vec<Box<dyn PackageSource>>,
    bind: BindSource,
    store: MemoryStore,
    load_state: HashMap<SourceKey, LoadState>,
    installed: InstalledRepos,
}

impl RepositoryManager {
    /// A manager over the developer roots in `settings` plus host bind packages.
    pub fn new(settings: &Settings, loader: Rc<dyn DefinitionLoader>, tags: Rc<dyn TagLister>) -> Self {
        Self::with_bind_source(settings, loader, tags, BindSource::detect())
    }

    /// Like [`RepositoryManager::new`] with explicit bind packages.
    pub fn with_bind_source(
        settings: &Settings,
        loader: Rc<dyn DefinitionLoader>,
        tags: Rc<dyn TagLister>,
        bind: BindSource,
    ) -> Self {
        let mut sources: Vec<Box<dyn PackageSource>> = settings
            .dev_repository_roots
            .iter()
            .map(|root| {
                Box::new(DeveloperSource::new(root.clone(), Rc::clone(&loader), Rc::clone(&tags)))
                    as Box<dyn PackageSource>
            })
            .collect();
        sources.push(Box::new(bind.clone()));

        let mode = DeployMode::Install;
        Self {
            search_path: SearchPathConfig::new(installed_search_path(settings, mode)),
            settings: settings.clone(),
            mode,
            sources,
            bind,
            store: MemoryStore::default(),
            load_state: HashMap::new(),
            installed: InstalledRepos {
                loader,
                sources: RefCell::new(BTreeMap::new()),
            },
        }
    }

    /// The settings the manager was built from.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The current deploy mode.
    pub fn mode(&self) -> DeployMode {
        self.mode
    }

    /// Switch deploy mode. The ambient search path becomes the installed
    /// repositories visible in `mode`; loaded packages are kept.
    pub fn set_mode(&mut self, mode: DeployMode) {
        debug!("Repository mode: {mode}");
        self.mode = mode;
        self.search_path = SearchPathConfig::new(installed_search_path(&self.settings, mode));
    }

    /// The search path currently in effect.
    pub fn search_path(&self) -> &[SearchPath] {
        self.search_path.effective()
    }

    /// Memory locations of every loaded source, developer roots first.
    pub fn memory_paths(&self) -> Vec<SearchPath> {
        self.sources
            .iter()
            .map(|s| SearchPath::Memory(s.key().clone()))
            .collect()
    }

    /// Load state of the source stored under `key`.
    pub fn load_state(&self, key: &SourceKey) -> Option<&LoadState> {
        self.load_state.get(key)
    }

    /// Load `family` (or everything) from every source.
    ///
    /// With `recursive`, the requirement names of what was loaded are loaded
    /// too, until no new names turn up. Ephemerals are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first definition or listing error. The search path is
    /// restored either way.
    pub fn load(&mut self, family: Option<&PackageName>, recursive: bool) -> Result<()> {
        let Some(family) = family else {
            return self.load_all();
        };

        let mut queue = VecDeque::from([family.clone()]);
        let mut seen = HashSet::from([family.clone()]);
        while let Some(name) = queue.pop_front() {
            self.load_family(&name)?;
            if !recursive {
                break;
            }
            for requirement in self.requirement_names(&name) {
                if seen.insert(requirement.clone()) {
                    queue.push_back(requirement);
                }
            }
        }
        Ok(())
    }

    fn load_family(&mut self, family: &PackageName) -> Result<()> {
        let extra = self.memory_paths();
        let scoped = SearchPathOverride::extend(&mut self.search_path, extra);

        for source in &self.sources {
            let state = self.load_state.entry(source.key().clone()).or_default();
            if state.has_loaded(family) {
                continue;
            }
            let packages = {
                let view = SearchView {
                    store: &self.store,
                    installed: &self.installed,
                    paths: scoped.effective().to_vec(),
                };
                source.load(family, &LoadScope::new(&view))?
            };
            trace!("Loaded {} version(s) of {family} from {}", packages.len(), source.key());
            if !packages.is_empty() {
                self.store.insert(source.key(), family.clone(), packages);
            }
            state.loaded.insert(family.clone());
        }
        Ok(())
    }

    fn load_all(&mut self) -> Result<()> {
        let extra = self.memory_paths();
        let scoped = SearchPathOverride::extend(&mut self.search_path, extra);

        for source in &self.sources {
            let state = self.load_state.entry(source.key().clone()).or_default();
            if state.fully_loaded {
                continue;
            }
            let batches = {
                let view = SearchView {
                    store: &self.store,
                    installed: &self.installed,
                    paths: scoped.effective().to_vec(),
                };
                source.load_all(&LoadScope::new(&view))?
            };
            debug!("Loaded {} families from {}", batches.len(), source.key());
            for (family, packages) in batches {
                self.store.insert(source.key(), family, packages);
            }
            state.fully_loaded = true;
        }
        Ok(())
    }

    fn requirement_names(&self, family: &PackageName) -> Vec<PackageName> {
        let mut names = Vec::new();
        for source in &self.sources {
            for package in self.store.family(source.key(), family) {
                let runtime = package
                    .variants(false)
                    .iter()
                    .flat_map(|v| v.runtime_requirements(false))
                    .collect::<Vec<_>>();
                for requirement in runtime.into_iter().chain(package.all_build_requirements()) {
                    if !requirement.ephemeral && !names.contains(&requirement.name) {
                        names.push(requirement.name);
                    }
                }
            }
        }
        names
    }

    /// The latest memory-backed package matching `request`.
    ///
    /// # Errors
    ///
    /// Propagates load errors.
    pub fn find(&mut self, request: &Requirement, load_dependency: bool) -> Result<Option<Arc<Package>>> {
        self.load(Some(&request.name), load_dependency)?;
        let view = self.view(self.memory_paths());
        latest_matching(&view, request)
    }

    /// The latest installed package matching `request` on `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if an installed definition cannot be read.
    pub fn find_installed(&self, request: &Requirement, paths: &[PathBuf]) -> Result<Option<Arc<Package>>> {
        let view = self.view(paths.iter().cloned().map(SearchPath::Filesystem).collect());
        latest_matching(&view, request)
    }

    /// A view over `paths`, first path winning on equal versions.
    pub fn view(&self, paths: Vec<SearchPath>) -> SearchView<'_> {
        SearchView {
            store: &self.store,
            installed: &self.installed,
            paths,
        }
    }

    /// Drop the cached listing of the installed repository at `path`.
    pub fn invalidate(&self, path: &Path) {
        self.installed.invalidate(path);
    }

    /// Write the synthesized package `family` into `deploy_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `family` is not a bind package or cannot be written.
    pub fn materialize(&self, family: &PackageName, deploy_path: &Path) -> Result<PathBuf> {
        self.bind.materialize(family, deploy_path)
    }

    /// Every family the memory-backed sources provide.
    ///
    /// # Errors
    ///
    /// Propagates load errors.
    pub fn family_names(&mut self) -> Result<Vec<PackageName>> {
        self.load(None, false)?;
        let names: BTreeSet<&PackageName> = self
            .sources
            .iter()
            .flat_map(|s| self.store.family_names(s.key()))
            .collect();
        Ok(names.into_iter().cloned().collect())
    }

    /// Every memory-backed version of `family`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates load errors.
    pub fn packages(&mut self, family: &PackageName) -> Result<Vec<Arc<Package>>> {
        self.load(Some(family), false)?;
        self.view(self.memory_paths()).packages(family)
    }
}

fn installed_search_path(settings: &Settings, mode: DeployMode) -> Vec<SearchPath> {
    settings
        .installed_packages_path(mode)
        .into_iter()
        .map(SearchPath::Filesystem)
        .collect()
}

impl std::fmt::Debug for RepositoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryManager")
            .field("mode", &self.mode)
            .field("search_path", &self.search_path)
            .field("load_state", &self.load_state)
            .finish_non_exhaustive()
    }
}
