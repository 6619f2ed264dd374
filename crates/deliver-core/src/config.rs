//! User settings.
//!
//! Settings live in a TOML file located by [`paths::config_path`]. Every key is
//! optional; missing keys take the defaults below. All paths are passed through
//! [`paths::expand_path`] on load.
//!
//! ```toml
//! packages_path = ["~/packages", "~/.deliver/release"]
//! local_packages_path = "~/packages"
//! release_packages_path = "~/.deliver/release"
//! dev_repository_roots = ["~/dev/packages"]
//! build_command = ["rez-build", "--install"]
//! release_command = ["rez-release"]
//! max_git_tags = 10
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DeliverError, Result};
use crate::paths::{self, expand_path};

/// Where a deploy run puts packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Any path other than the release path.
    #[default]
    Install,
    /// The configured release path.
    Release,
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Release => f.write_str("release"),
        }
    }
}

/// Settings shared by the repository manager, solver and installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Installed package repositories, searched in order.
    pub packages_path: Vec<PathBuf>,
    /// The local (per-user) install path. Also the default install target.
    pub local_packages_path: PathBuf,
    /// The shared release path.
    pub release_packages_path: PathBuf,
    /// Directories holding developer package definitions.
    pub dev_repository_roots: Vec<PathBuf>,
    /// Command used to build and install a developer package.
    pub build_command: Vec<String>,
    /// Command used to build and release a developer package.
    pub release_command: Vec<String>,
    /// How many remote tags to expand for tag-driven definitions.
    pub max_git_tags: usize,
    /// Where build logs go. `None` streams build output to the terminal.
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let local = expand_path("~/packages");
        let release = expand_path("~/.deliver/release");
        Self {
            packages_path: vec![local.clone(), release.clone()],
            local_packages_path: local,
            release_packages_path: release,
            dev_repository_roots: Vec::new(),
            build_command: vec!["rez-build".to_string(), "--install".to_string()],
            release_command: vec!["rez-release".to_string()],
            max_git_tags: 10,
            log_dir: paths::log_dir(),
        }
    }
}

impl Settings {
    /// Load settings from the configured file, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Config`] if the file exists but cannot be read
    /// or parsed, or if the result fails [`Settings::validate`].
    pub fn load() -> Result<Self> {
        match paths::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                debug!("No settings file at {}, using defaults", path.display());
                let settings = Self::default();
                settings.validate()?;
                Ok(settings)
            }
            None => Err(DeliverError::Config(
                "Could not determine home directory. Set DELIVER_HOME or DELIVER_CONFIG.".to_string(),
            )),
        }
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Config`] on read, parse or validation failure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DeliverError::Config(format!("{}: {e}", path.display())))?;
        debug!("Loading settings from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Config`] on parse or validation failure.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| DeliverError::Config(e.to_string()))?;
        let settings = settings.expanded();
        settings.validate()?;
        Ok(settings)
    }

    fn expanded(mut self) -> Self {
        self.packages_path = self.packages_path.iter().map(expand_path).collect();
        self.local_packages_path = expand_path(&self.local_packages_path);
        self.release_packages_path = expand_path(&self.release_packages_path);
        self.dev_repository_roots = self.dev_repository_roots.iter().map(expand_path).collect();
        self.log_dir = self.log_dir.as_ref().map(expand_path);
        self
    }

    /// Check the settings for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.build_command.is_empty() {
            return Err(DeliverError::Config("build_command must not be empty".to_string()));
        }
        if self.release_command.is_empty() {
            return Err(DeliverError::Config("release_command must not be empty".to_string()));
        }
        if self.max_git_tags == 0 {
            return Err(DeliverError::Config("max_git_tags must be at least 1".to_string()));
        }
        if self.release_packages_path.as_os_str().is_empty() {
            return Err(DeliverError::Config("release_packages_path is not set".to_string()));
        }
        Ok(())
    }

    /// `packages_path` without the local packages path.
    pub fn nonlocal_packages_path(&self) -> Vec<PathBuf> {
        let local = expand_path(&self.local_packages_path);
        self.packages_path
            .iter()
            .filter(|p| expand_path(p) != local)
            .cloned()
            .collect()
    }

    /// Installed repositories visible in `mode`.
    ///
    /// Releases must only depend on released packages, so release mode hides
    /// the local path.
    pub fn installed_packages_path(&self, mode: DeployMode) -> Vec<PathBuf> {
        match mode {
            DeployMode::Install => self.packages_path.clone(),
            DeployMode::Release => self.nonlocal_packages_path(),
        }
    }

    /// The deploy mode implied by targeting `path`.
    ///
    /// Release only when `path` normalizes to exactly the release path.
    pub fn mode_for(&self, path: &Path) -> DeployMode {
        if expand_path(path) == expand_path(&self.release_packages_path) {
            DeployMode::Release
        } else {
            DeployMode::Install
        }
    }
}
