use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use deliver_schema::{Package, PackageName, Version};
use tracing::{debug, warn};

use super::{LoadScope, PackageSource, SourceKey};
use crate::definition::{DefinitionLoader, PackageDefinition};
use crate::error::Result;
use crate::tags::TagLister;

/// Developer package definitions below one root directory.
///
/// A definition with a `git_url` is expanded into one package per remote tag,
/// versioned `<tag>-<definition version>`.
pub struct DeveloperSource {
    key: SourceKey,
    root: PathBuf,
    loader: Rc<dyn DefinitionLoader>,
    tags: Rc<dyn TagLister>,
}

impl DeveloperSource {
    /// A source reading `root` through `loader`.
    pub fn new(root: impl Into<PathBuf>, loader: Rc<dyn DefinitionLoader>, tags: Rc<dyn TagLister>) -> Self {
        let root = root.into();
        Self {
            key: SourceKey::Developer(root.clone()),
            root,
            loader,
            tags,
        }
    }

    fn expand(&self, definition: PackageDefinition) -> Vec<Arc<Package>> {
        let Some(url) = definition.git_url.as_deref() else {
            return vec![Arc::new(definition.package)];
        };

        let tags = match self.tags.list_tags(url) {
            Ok(tags) if !tags.is_empty() => tags,
            Ok(_) => {
                debug!("{url} has no tags, using definition version");
                return vec![Arc::new(definition.package)];
            }
            Err(e) => {
                warn!("Cannot list tags of {url}: {e:#}");
                return vec![Arc::new(definition.package)];
            }
        };

        tags.iter()
            .filter_map(|tag| tag_version(tag, &definition.package.version))
            .map(|version| {
                let mut package = definition.package.clone();
                package.version = version;
                Arc::new(package)
            })
            .collect()
    }
}

fn tag_version(tag: &str, definition_version: &Version) -> Option<Version> {
    let text = if definition_version.is_empty() {
        tag.to_string()
    } else {
        format!("{tag}-{definition_version}")
    };
    match Version::parse(&text) {
        Ok(version) => Some(version),
        Err(e) => {
            debug!("Ignoring tag '{tag}': {e}");
            None
        }
    }
}

impl PackageSource for DeveloperSource {
    fn key(&self) -> &SourceKey {
        &self.key
    }

    fn family_names(&self) -> Result<Vec<PackageName>> {
        self.loader.family_names(&self.root)
    }

    fn load(&self, family: &PackageName, scope: &LoadScope<'_>) -> Result<Vec<Arc<Package>>> {
        let definitions = self.loader.load_family(&self.root, family, scope)?;
        Ok(definitions
            .into_iter()
            .flat_map(|definition| self.expand(definition))
            .collect())
    }
}

impl std::fmt::Debug for DeveloperSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeveloperSource").field("root", &self.root).finish_non_exhaustive()
    }
}
