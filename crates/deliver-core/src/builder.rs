//! External build and release commands.
//!
//! A developer package is deployed by running the configured build command
//! (install mode) or release command (release mode) inside its source
//! directory. The command receives the variant to build as `--variants N`
//! and these environment variables:
//!
//! | Variable | Value |
//! |---|---|
//! | `DELIVER_PACKAGE` | Qualified package name |
//! | `DELIVER_VARIANT` | Variant index, empty for packages without variants |
//! | `DELIVER_DEPLOY_PATH` | The deploy path |
//! | `DELIVER_MODE` | `install` or `release` |
//!
//! With a log directory configured, output goes to a timestamped log file and
//! the last lines are attached to the error on failure.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;
use deliver_schema::{PackageName, PackageOrigin, Version};
use tracing::{debug, info};

use crate::config::{DeployMode, Settings};
use crate::error::{DeliverError, Result};
use crate::paths::build_log_path;
use crate::solve::ManifestEntry;

const TAIL_LINES: usize = 20;

/// Everything a runner needs to deploy one developer variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    /// Package family.
    pub package: PackageName,
    /// Package version.
    pub version: Version,
    /// `name-version`.
    pub qualified_name: String,
    /// Variant to build.
    pub variant: Option<usize>,
    /// Directory holding the package definition.
    pub source_dir: PathBuf,
    /// Where the package is deployed.
    pub deploy_path: PathBuf,
    /// Build or release.
    pub mode: DeployMode,
}

impl BuildCommand {
    /// The command deploying `entry` into `deploy_path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Other`] if the entry does not come from a
    /// developer definition.
    pub fn for_entry(entry: &ManifestEntry, deploy_path: &Path, mode: DeployMode) -> Result<Self> {
        let Some(PackageOrigin::Developer(source_dir)) = entry.source() else {
            return Err(DeliverError::Other(format!(
                "{} has no developer source to build from",
                entry.id()
            )));
        };
        Ok(Self {
            package: entry.family().clone(),
            version: entry.version().cloned().unwrap_or_default(),
            qualified_name: entry.name().to_string(),
            variant: entry.index(),
            source_dir: source_dir.clone(),
            deploy_path: deploy_path.to_path_buf(),
            mode,
        })
    }
}

/// Runs build and release commands.
pub trait CommandRunner {
    /// Run `command` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::ExternalProcess`] when the process exits
    /// unsuccessfully.
    fn run(&self, command: &BuildCommand) -> Result<()>;
}

/// Spawns the configured commands as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    build_command: Vec<String>,
    release_command: Vec<String>,
    log_dir: Option<PathBuf>,
}

impl ProcessRunner {
    /// A runner using the commands and log directory from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            build_command: settings.build_command.clone(),
            release_command: settings.release_command.clone(),
            log_dir: settings.log_dir.clone(),
        }
    }

    fn template(&self, mode: DeployMode) -> &[String] {
        match mode {
            DeployMode::Install => &self.build_command,
            DeployMode::Release => &self.release_command,
        }
    }

    /// The argument vector [`CommandRunner::run`] would spawn for `command`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliverError::Config`] if the command for the mode is empty.
    pub fn command_line(&self, command: &BuildCommand) -> Result<Vec<String>> {
        let mut args = self.template(command.mode).to_vec();
        if args.is_empty() {
            return Err(DeliverError::Config(format!("{} command is empty", command.mode)));
        }
        if let Some(index) = command.variant {
            args.push("--variants".to_string());
            args.push(index.to_string());
        }
        Ok(args)
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &BuildCommand) -> Result<()> {
        let args = self.command_line(command)?;
        let shown = args.join(" ");
        info!("{}: {shown}", command.qualified_name);

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..])
            .current_dir(&command.source_dir)
            .env("DELIVER_PACKAGE", &command.qualified_name)
            .env(
                "DELIVER_VARIANT",
                command.variant.map(|i| i.to_string()).unwrap_or_default(),
            )
            .env("DELIVER_DEPLOY_PATH", &command.deploy_path)
            .env("DELIVER_MODE", command.mode.to_string());

        let log_path = self
            .log_dir
            .as_deref()
            .map(|dir| build_log_path(dir, &command.qualified_name));

        let status = match &log_path {
            None => cmd
                .status()
                .with_context(|| format!("Failed to execute {shown}"))?,
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                debug!("Logging {} to {}", command.qualified_name, path.display());
                let log_file = File::create(path).context("Failed to create build log file")?;
                cmd.stdout(Stdio::from(log_file.try_clone()?))
                    .stderr(Stdio::from(log_file))
                    .status()
                    .with_context(|| format!("Failed to execute {shown}"))?
            }
        };

        if status.success() {
            return Ok(());
        }
        let tail = log_path
            .as_deref()
            .and_then(|path| read_last_lines(path, TAIL_LINES).ok())
            .unwrap_or_default();
        Err(DeliverError::ExternalProcess {
            command: shown,
            code: status.code(),
            log: log_path,
            tail,
        })
    }
}

/// Read the last `n` lines of a file without loading all of it.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let seek_pos = len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let buffer = String::from_utf8_lossy(&bytes);

    // Seeking can land mid-line.
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&*buffer, |idx| &buffer[idx + 1..])
    } else {
        &*buffer
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}
