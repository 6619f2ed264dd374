//! Command implementations

pub mod deploy;
pub mod list;

use std::rc::Rc;

use deliver_core::definition::TomlDefinitionLoader;
use deliver_core::tags::GitTagLister;
use deliver_core::{RepositoryManager, Settings};

/// A repository manager reading TOML definitions and listing remote tags
/// with git.
pub fn repository(settings: &Settings) -> RepositoryManager {
    RepositoryManager::new(
        settings,
        Rc::new(TomlDefinitionLoader),
        Rc::new(GitTagLister::new(settings.max_git_tags)),
    )
}
