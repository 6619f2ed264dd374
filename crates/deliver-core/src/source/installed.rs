use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use deliver_schema::{Package, PackageName, PackageOrigin};
use tracing::trace;

use super::{LoadScope, PackageSource, SourceKey};
use crate::definition::DefinitionLoader;
use crate::error::Result;

#[derive(Debug, Default)]
struct ListingCache {
    families: Option<BTreeSet<PackageName>>,
    packages: HashMap<PackageName, Vec<Arc<Package>>>,
}

/// Already-deployed packages below one install or release path.
///
/// The family listing and each family's packages are cached on first use and
/// kept until [`InstalledSource::invalidate`] is called, so a family deployed
/// after the first query stays invisible until then.
pub struct InstalledSource {
    key: SourceKey,
    root: PathBuf,
    loader: Rc<dyn DefinitionLoader>,
    cache: RefCell<ListingCache>,
}

impl InstalledSource {
    /// A source reading `root` through `loader`.
    pub fn new(root: impl Into<PathBuf>, loader: Rc<dyn DefinitionLoader>) -> Self {
        let root = root.into();
        Self {
            key: SourceKey::Installed(root.clone()),
            root,
            loader,
            cache: RefCell::new(ListingCache::default()),
        }
    }

    /// Every installed version of `family`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be listed or a definition
    /// cannot be read.
    pub fn family(&self, family: &PackageName) -> Result<Vec<Arc<Package>>> {
        {
            let mut cache = self.cache.borrow_mut();
            if cache.families.is_none() {
                trace!("Listing families in {}", self.root.display());
                cache.families = Some(self.loader.family_names(&self.root)?.into_iter().collect());
            }
            if !cache.families.as_ref().is_some_and(|f| f.contains(family)) {
                return Ok(Vec::new());
            }
            if let Some(packages) = cache.packages.get(family) {
                return Ok(packages.clone());
            }
        }

        let mut packages: Vec<Arc<Package>> = self
            .loader
            .load_family(&self.root, family, &LoadScope::empty())?
            .into_iter()
            .map(|definition| {
                let mut package = definition.package;
                package.origin = PackageOrigin::Installed(definition.directory);
                Arc::new(package)
            })
            .collect();
        packages.sort_by(|a, b| a.version.cmp(&b.version));

        self.cache
            .borrow_mut()
            .packages
            .insert(family.clone(), packages.clone());
        Ok(packages)
    }

    /// Forget the cached listing after the repository changed on disk.
    pub fn invalidate(&self) {
        trace!("Invalidating listing of {}", self.root.display());
        *self.cache.borrow_mut() = ListingCache::default();
    }
}

impl PackageSource for InstalledSource {
    fn key(&self) -> &SourceKey {
        &self.key
    }

    fn family_names(&self) -> Result<Vec<PackageName>> {
        self.loader.family_names(&self.root)
    }

    fn load(&self, family: &PackageName, _scope: &LoadScope<'_>) -> Result<Vec<Arc<Package>>> {
        self.family(family)
    }
}

impl std::fmt::Debug for InstalledSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledSource")
            .field("root", &self.root)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
