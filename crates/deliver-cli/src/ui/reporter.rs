//! Progress output for the solver and installer

use std::path::Path;

use crossterm::style::Stylize;
use deliver_core::{DeployMode, ManifestEntry, Reporter};

use super::status_color;

/// Prints solver and installer progress to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalReporter;

impl Reporter for TerminalReporter {
    fn mode(&self, mode: DeployMode, path: &Path) {
        tracing::debug!("{mode} mode, deploying to {}", path.display());
    }

    fn resolve_failed(&self, request: &str, detail: &str) {
        println!("  {} {}", "failed".red().bold(), request.bold());
        for line in detail.lines() {
            println!("    {}", line.dark_grey());
        }
    }

    fn skipped(&self, entry: &ManifestEntry) {
        let status = entry.status();
        println!(
            "  {} {} {}",
            "skip".dark_grey(),
            entry.id(),
            format!("({status})").with(status_color(status))
        );
    }

    fn building(&self, entry: &ManifestEntry) {
        println!("  {} {}", "build".cyan().bold(), entry.id());
    }

    fn binding(&self, entry: &ManifestEntry) {
        println!("  {} {}", "bind".cyan().bold(), entry.id());
    }

    fn deployed(&self, entry: &ManifestEntry, _path: &Path) {
        println!("  {} {}", "done".green().bold(), entry.id());
    }

    fn warning(&self, msg: &str) {
        println!("  {} {msg}", "WARNING:".yellow().bold());
    }
}
