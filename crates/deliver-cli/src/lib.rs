//! deliver - resolve, build and release developer packages
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Resolves package requests against developer trees and installed
//! repositories, shows the resulting manifest, and builds (or releases) every
//! package that is not deployed yet, dependencies first.
//!
//! # Examples
//!
//! ```text
//! deliver foo                 # show what deploying foo would involve
//! deliver foo -i              # build foo and its missing dependencies locally
//! deliver foo -i /tmp/pkgs    # ... into another install path
//! deliver foo-2 "!bar-3" -r   # release foo-2, never using bar-3
//! deliver -l                  # list developer packages
//! ```
//!
//! Settings come from `$DELIVER_CONFIG`, else `$DELIVER_HOME/config.toml`,
//! else `~/.deliver/config.toml`. Set `RUST_LOG=deliver_core=debug` for
//! resolver tracing.

pub mod cmd;
pub mod ui;

use clap::Parser;
use std::path::PathBuf;

use crate::cmd::deploy::Target;

#[derive(Debug, Parser)]
#[command(name = "deliver")]
#[command(author, version, about = "deliver - resolve, build and release developer packages")]
pub struct Cli {
    /// Package requests: foo, foo-1.2, "foo-1+<2", bar-1[0], "!conflict", "~weak-1"
    #[arg(required_unless_present = "list")]
    pub packages: Vec<String>,

    /// Release into the configured release path
    #[arg(short, long, conflicts_with = "install")]
    pub release: bool,

    /// Install into PATH, or the local packages path if omitted
    #[arg(short, long, value_name = "PATH", num_args = 0..=1)]
    pub install: Option<Option<PathBuf>>,

    /// List developer packages, optionally only the named families
    #[arg(short, long, conflicts_with_all = ["release", "install", "dry_run", "yes"])]
    pub list: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the commands that would run without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// The deploy target selected by `--release` / `--install`.
    pub fn target(&self) -> Target {
        if self.release {
            Target::Release
        } else if let Some(path) = &self.install {
            Target::Install(path.clone())
        } else {
            Target::Preview
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("deliver").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_path_is_optional() {
        assert_eq!(parse(&["foo", "-i"]).unwrap().target(), Target::Install(None));
        assert_eq!(
            parse(&["foo", "--install", "/tmp/pkgs"]).unwrap().target(),
            Target::Install(Some(PathBuf::from("/tmp/pkgs")))
        );
        assert_eq!(parse(&["foo", "-r"]).unwrap().target(), Target::Release);
        assert_eq!(parse(&["foo"]).unwrap().target(), Target::Preview);
    }

    #[test]
    fn test_release_and_install_conflict() {
        assert!(parse(&["foo", "-r", "-i"]).is_err());
    }

    #[test]
    fn test_packages_required_unless_listing() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--list"]).unwrap().packages.is_empty());
        assert!(parse(&["--list", "-y"]).is_err());
    }
}
