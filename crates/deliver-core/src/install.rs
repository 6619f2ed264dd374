//! Manifest execution.
//!
//! [`PackageInstaller`] wraps a [`RequestSolver`] and deploys every Ready
//! entry of its manifest into a target path: synthesized packages by writing
//! their definition, developer packages by running the build or release
//! command. Everything else is skipped.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::builder::{BuildCommand, CommandRunner};
use crate::config::DeployMode;
use crate::error::{DeliverError, Result};
use crate::paths::expand_path;
use crate::solve::{ManifestEntry, RequestSolver, Status};

/// Resolves requests and deploys the result.
///
/// Dereferences to the wrapped [`RequestSolver`] for resolving and reading
/// the manifest.
pub struct PackageInstaller {
    solver: RequestSolver,
    runner: Box<dyn CommandRunner>,
    deploy_path: Option<PathBuf>,
}

impl PackageInstaller {
    /// An installer running builds through `runner`.
    pub fn new(solver: RequestSolver, runner: impl CommandRunner + 'static) -> Self {
        Self {
            solver,
            runner: Box::new(runner),
            deploy_path: None,
        }
    }

    /// Deploy into `path` from now on.
    ///
    /// The mode is release exactly when `path` is the configured release
    /// path. The manifest is reset.
    pub fn target(&mut self, path: &Path) -> DeployMode {
        let path = expand_path(path);
        let mode = self.solver.repository().settings().mode_for(&path);
        info!("Deploying to {} ({mode})", path.display());

        self.solver.set_mode(mode);
        self.solver.reporter().mode(mode, &path);
        self.deploy_path = Some(path);
        mode
    }

    /// The current deploy path.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Config`] before [`PackageInstaller::target`]
    /// has been called.
    pub fn deploy_path(&self) -> Result<&Path> {
        self.deploy_path
            .as_deref()
            .ok_or_else(|| DeliverError::Config("no deploy path targeted".to_string()))
    }

    /// Deploy every Ready entry, stopping at the first failure.
    ///
    /// Returns how many entries were deployed.
    ///
    /// # Errors
    ///
    /// Returns the first deploy error, typically
    /// [`DeliverError::ExternalProcess`].
    pub fn run(&mut self) -> Result<usize> {
        let mut deployed = 0;
        for outcome in self.run_iter()? {
            outcome?;
            deployed += 1;
        }
        Ok(deployed)
    }

    /// Deploy lazily, one Ready entry per step.
    ///
    /// The manifest is snapshotted when this is called. Iteration ends after
    /// the first error.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Config`] if no deploy path is targeted.
    pub fn run_iter(&mut self) -> Result<RunIter<'_>> {
        let deploy_path = self.deploy_path()?.to_path_buf();
        let entries = self.solver.manifest().into_iter();
        Ok(RunIter {
            installer: self,
            entries,
            deploy_path,
            stopped: false,
        })
    }

    fn deploy(&self, entry: &ManifestEntry, deploy_path: &Path) -> Result<()> {
        let reporter = self.solver.reporter();
        if entry.is_synthesized() {
            reporter.binding(entry);
            let path = self.solver.repository().materialize(entry.family(), deploy_path)?;
            debug!("Wrote {}", path.display());
        } else {
            reporter.building(entry);
            let command = BuildCommand::for_entry(entry, deploy_path, self.solver.mode())?;
            self.runner.run(&command)?;
        }
        self.solver.repository().invalidate(deploy_path);
        reporter.deployed(entry, deploy_path);
        Ok(())
    }
}

impl Deref for PackageInstaller {
    type Target = RequestSolver;

    fn deref(&self) -> &Self::Target {
        &self.solver
    }
}

impl DerefMut for PackageInstaller {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.solver
    }
}

impl std::fmt::Debug for PackageInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageInstaller")
            .field("solver", &self.solver)
            .field("deploy_path", &self.deploy_path)
            .finish_non_exhaustive()
    }
}

/// Lazy, single-pass manifest execution. See [`PackageInstaller::run_iter`].
pub struct RunIter<'a> {
    installer: &'a mut PackageInstaller,
    entries: std::vec::IntoIter<ManifestEntry>,
    deploy_path: PathBuf,
    stopped: bool,
}

impl Iterator for RunIter<'_> {
    type Item = Result<ManifestEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        for entry in self.entries.by_ref() {
            if entry.status() != Status::Ready {
                self.installer.solver.reporter().skipped(&entry);
                continue;
            }
            let outcome = self.installer.deploy(&entry, &self.deploy_path);
            self.stopped = outcome.is_err();
            return Some(outcome.map(|()| entry));
        }
        None
    }
}

impl std::fmt::Debug for RunIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunIter")
            .field("remaining", &self.entries.len())
            .field("deploy_path", &self.deploy_path)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}
