//! Core library for deliver.
//!
//! Loads package definitions from developer trees, synthesizes host packages,
//! reads installed repositories, resolves a request into an ordered install
//! manifest and executes that manifest.
//!
//! The layers, leaves first:
//!
//! - [`source`]: the three kinds of [`PackageSource`](source::PackageSource)
//! - [`repository`]: [`RepositoryManager`] aggregating sources in memory
//! - [`solve`]: [`RequestSolver`] producing the manifest
//! - [`install`]: [`PackageInstaller`] executing it
//!
//! Collaborators sit behind traits: [`DefinitionLoader`](definition::DefinitionLoader),
//! [`TagLister`](tags::TagLister), [`ContextEngine`](engine::ContextEngine) and
//! [`CommandRunner`](builder::CommandRunner).

pub mod builder;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod install;
pub mod paths;
pub mod pubgrub_adapter;
pub mod repository;
pub mod solve;
pub mod source;
pub mod tags;

pub mod reporter;

pub use builder::{BuildCommand, CommandRunner, ProcessRunner};
pub use config::{DeployMode, Settings};
pub use error::{DeliverError, Result};
pub use install::PackageInstaller;
pub use paths::*;
pub use pubgrub_adapter::PubgrubEngine;
pub use repository::RepositoryManager;
pub use reporter::{NullReporter, Reporter};
pub use solve::{EntryId, ManifestEntry, RequestSolver, Status};
