//! Manifest table

use std::path::Path;

use crossterm::style::Stylize;
use deliver_core::{DeployMode, ManifestEntry, Status};

use super::{NAME_WIDTH, STATUS_WIDTH, status_color};

/// Print the manifest in deploy order, one row per entry.
pub fn print_manifest(manifest: &[ManifestEntry], mode: DeployMode, path: &Path) {
    println!();
    println!(
        "  {} {}",
        format!("{mode} ->").dark_grey(),
        path.display().to_string().bold()
    );
    println!();

    if manifest.is_empty() {
        println!("  Nothing requested.");
        return;
    }

    let header = format!(
        "  {:<nw$} {:<sw$} {}",
        "package",
        "status",
        "source",
        nw = NAME_WIDTH,
        sw = STATUS_WIDTH,
    );
    println!("{}", header.dark_grey());

    for entry in manifest {
        print_row(entry);
    }

    let ready = count(manifest, Status::Ready);
    let failed = count(manifest, Status::ResolveFailed) + count(manifest, Status::PackageNotFound);
    println!();
    let mut footer = format!("  {} package(s), {ready} to deploy", manifest.len());
    if failed > 0 {
        footer.push_str(&format!(", {failed} unresolved"));
    }
    println!("{}", footer.dark_grey());
}

fn print_row(entry: &ManifestEntry) {
    let name = format!("{:<width$}", entry.id().to_string(), width = NAME_WIDTH);
    let status = format!("{:<width$}", entry.status().to_string(), width = STATUS_WIDTH);
    let source = entry.source().map(ToString::to_string).unwrap_or_default();
    println!(
        "  {} {} {}",
        name.bold(),
        status.with(status_color(entry.status())),
        source.dark_grey()
    );
}

fn count(manifest: &[ManifestEntry], status: Status) -> usize {
    manifest.iter().filter(|e| e.status() == status).count()
}
