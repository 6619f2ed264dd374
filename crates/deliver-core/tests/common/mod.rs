//! Shared fixture: developer, install and release trees in a temp dir.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use deliver_core::builder::{BuildCommand, CommandRunner};
use deliver_core::definition::{DefinitionFile, PackageInfo, TomlDefinitionLoader, write_definition};
use deliver_core::source::{BindSource, HostFacts};
use deliver_core::tags::StaticTagLister;
use deliver_core::{
    DeliverError, DeployMode, ManifestEntry, PackageInstaller, PubgrubEngine, Reporter, RepositoryManager,
    RequestSolver, Result, Settings, Status,
};
use tempfile::TempDir;

#[derive(Debug)]
pub struct Fixture {
    pub temp_dir: TempDir,
    pub settings: Settings,
}

impl Fixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let root = temp_dir.path();
        for dir in ["dev", "install", "release"] {
            std::fs::create_dir_all(root.join(dir)).expect("failed to create repository dir");
        }
        let settings = Settings {
            packages_path: vec![root.join("install"), root.join("release")],
            local_packages_path: root.join("install"),
            release_packages_path: root.join("release"),
            dev_repository_roots: vec![root.join("dev")],
            log_dir: None,
            ..Settings::default()
        };
        Self { temp_dir, settings }
    }

    pub fn dev_root(&self) -> PathBuf {
        self.temp_dir.path().join("dev")
    }

    pub fn install_root(&self) -> PathBuf {
        self.temp_dir.path().join("install")
    }

    pub fn release_root(&self) -> PathBuf {
        self.temp_dir.path().join("release")
    }

    /// Define a developer package.
    pub fn dev(&self, name: &str, version: &str, requires: &[&str], variants: &[&[&str]]) {
        define(&self.dev_root(), name, version, requires, variants);
    }

    /// Deploy a package into the local install path.
    pub fn installed(&self, name: &str, version: &str, requires: &[&str], variants: &[&[&str]]) {
        define(&self.install_root(), name, version, requires, variants);
    }

    /// Deploy a package into the release path.
    pub fn released(&self, name: &str, version: &str, requires: &[&str], variants: &[&[&str]]) {
        define(&self.release_root(), name, version, requires, variants);
    }

    pub fn repository(&self) -> RepositoryManager {
        let facts = HostFacts {
            platform: "linux".into(),
            arch: "x86_64".into(),
            os: "ubuntu-22.04".into(),
        };
        RepositoryManager::with_bind_source(
            &self.settings,
            Rc::new(TomlDefinitionLoader),
            Rc::new(StaticTagLister::new()),
            BindSource::new(facts),
        )
    }

    pub fn solver(&self) -> RequestSolver {
        RequestSolver::new(self.repository(), PubgrubEngine)
    }

    pub fn installer(&self, runner: RecordingRunner, reporter: Arc<RecordingReporter>) -> PackageInstaller {
        PackageInstaller::new(self.solver().with_reporter(reporter), runner)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

fn define(root: &Path, name: &str, version: &str, requires: &[&str], variants: &[&[&str]]) {
    let strings = |items: &[&str]| items.iter().map(ToString::to_string).collect::<Vec<_>>();
    let file = DefinitionFile {
        package: PackageInfo {
            name: name.to_string(),
            version: version.to_string(),
            requires: strings(requires),
            variants: variants.iter().map(|v| strings(v)).collect(),
            ..PackageInfo::default()
        },
        building: None,
    };
    write_definition(root, &file).expect("failed to write definition");
}

/// `(name, status)` pairs of the manifest, in order.
pub fn summary(entries: &[ManifestEntry]) -> Vec<(String, Status)> {
    entries.iter().map(|e| (e.id().to_string(), e.status())).collect()
}

/// Records build commands; optionally fails one package.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    pub commands: Arc<Mutex<Vec<BuildCommand>>>,
    pub fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn built(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| match c.variant {
                Some(i) => format!("{}[{i}]", c.qualified_name),
                None => c.qualified_name.clone(),
            })
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &BuildCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        if self.fail_on.as_deref() == Some(command.qualified_name.as_str()) {
            return Err(DeliverError::ExternalProcess {
                command: "rez-build --install".to_string(),
                code: Some(1),
                log: None,
                tail: "error: build failed".to_string(),
            });
        }
        Ok(())
    }
}

/// Records reporter events as strings.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Reporter for RecordingReporter {
    fn mode(&self, mode: DeployMode, _path: &Path) {
        self.push(format!("mode {mode}"));
    }
    fn resolve_failed(&self, request: &str, _detail: &str) {
        self.push(format!("failed {request}"));
    }
    fn skipped(&self, entry: &ManifestEntry) {
        self.push(format!("skipped {}", entry.id()));
    }
    fn building(&self, entry: &ManifestEntry) {
        self.push(format!("building {}", entry.id()));
    }
    fn binding(&self, entry: &ManifestEntry) {
        self.push(format!("binding {}", entry.id()));
    }
    fn deployed(&self, entry: &ManifestEntry, _path: &Path) {
        self.push(format!("deployed {}", entry.id()));
    }
    fn warning(&self, _msg: &str) {}
}
