//! Resolve requests and deploy the manifest

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use deliver_core::{
    BuildCommand, NullReporter, PackageInstaller, ProcessRunner, PubgrubEngine, Reporter,
    RequestSolver, Settings, Status,
};

use crate::ui::{self, TerminalReporter};

/// Where a run deploys to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Resolve against the local install path and stop after the manifest.
    Preview,
    /// Install into the given path, or the local packages path.
    Install(Option<PathBuf>),
    /// Release into the release path.
    Release,
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub target: Target,
    pub yes: bool,
    pub dry_run: bool,
    pub json: bool,
}

/// Resolve `requests`, show the manifest and deploy every Ready entry.
pub fn deploy(requests: &[String], options: &DeployOptions) -> Result<()> {
    let deploying = options.target != Target::Preview && !options.dry_run;
    if options.json && deploying && !options.yes {
        bail!("--json cannot prompt for confirmation; pass --yes or --dry-run");
    }

    let settings = Settings::load().context("Failed to load settings")?;
    let runner = ProcessRunner::from_settings(&settings);
    let reporter: Arc<dyn Reporter> = if options.json {
        Arc::new(NullReporter)
    } else {
        Arc::new(TerminalReporter)
    };
    let solver = RequestSolver::new(super::repository(&settings), PubgrubEngine).with_reporter(reporter);
    let mut installer = PackageInstaller::new(solver, runner.clone());

    let path = match &options.target {
        Target::Release => settings.release_packages_path.clone(),
        Target::Install(Some(path)) => path.clone(),
        Target::Install(None) | Target::Preview => settings.local_packages_path.clone(),
    };
    let mode = installer.target(&path);

    let requests: Vec<&str> = requests.iter().map(String::as_str).collect();
    installer.resolve_requests(&requests)?;
    let manifest = installer.manifest();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        ui::manifest::print_manifest(&manifest, mode, &path);
    }

    let ready: Vec<_> = manifest.iter().filter(|e| e.status() == Status::Ready).collect();
    if options.target == Target::Preview {
        return Ok(());
    }
    if ready.is_empty() {
        if !options.json {
            ui::info("Nothing to deploy.");
        }
        return Ok(());
    }

    if options.dry_run {
        if options.json {
            return Ok(());
        }
        for entry in &ready {
            if entry.is_synthesized() {
                ui::planned(entry.id(), "write package definition", None);
                continue;
            }
            let command = BuildCommand::for_entry(entry, &path, mode)?;
            let line = runner.command_line(&command)?.join(" ");
            ui::planned(entry.id(), &line, Some(&command.source_dir));
        }
        return Ok(());
    }

    if !options.yes {
        let prompt = format!("Deploy {} package(s) to {}?", ready.len(), path.display());
        if !ui::confirm(&prompt)? {
            ui::info("Cancelled.");
            return Ok(());
        }
    }

    let deployed = installer.run()?;
    if !options.json {
        ui::success(deployed, mode, &path);
    }
    Ok(())
}
