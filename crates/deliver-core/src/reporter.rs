//! Reporter trait for dependency injection
//!
//! This trait allows the solver and installer to report progress and status
//! without being coupled to a specific terminal implementation.

use std::path::Path;

use crate::config::DeployMode;
use crate::solve::ManifestEntry;

/// Progress sink for the solver and installer.
pub trait Reporter: Send + Sync {
    /// The installer was pointed at a deploy path.
    fn mode(&self, mode: DeployMode, path: &Path);

    /// A resolve context for `request` could not be built or failed.
    fn resolve_failed(&self, request: &str, detail: &str);

    /// A manifest entry was not processed because it is not Ready.
    fn skipped(&self, entry: &ManifestEntry);

    /// A developer package is about to be built.
    fn building(&self, entry: &ManifestEntry);

    /// A synthesized package is about to be written to the deploy path.
    fn binding(&self, entry: &ManifestEntry);

    /// An entry finished deploying into `path`.
    fn deployed(&self, entry: &ManifestEntry, path: &Path);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn mode(&self, mode: DeployMode, path: &Path) {
        (**self).mode(mode, path);
    }
    fn resolve_failed(&self, request: &str, detail: &str) {
        (**self).resolve_failed(request, detail);
    }
    fn skipped(&self, entry: &ManifestEntry) {
        (**self).skipped(entry);
    }
    fn building(&self, entry: &ManifestEntry) {
        (**self).building(entry);
    }
    fn binding(&self, entry: &ManifestEntry) {
        (**self).binding(entry);
    }
    fn deployed(&self, entry: &ManifestEntry, path: &Path) {
        (**self).deployed(entry, path);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., listing, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn mode(&self, _: DeployMode, _: &Path) {}
    fn resolve_failed(&self, _: &str, _: &str) {}
    fn skipped(&self, _: &ManifestEntry) {}
    fn building(&self, _: &ManifestEntry) {}
    fn binding(&self, _: &ManifestEntry) {}
    fn deployed(&self, _: &ManifestEntry, _: &Path) {}
    fn warning(&self, _: &str) {}
}
